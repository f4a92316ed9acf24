//! Optional TOML config file, loaded the way `twoliter` loads
//! `Twoliter.toml` (`toml::from_str` + `serde`). Supplies per-flavor
//! default file name overrides and is entirely optional: absent, it
//! falls back to [`crate::kind::Flavor::default_file_names`].

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::kind::Flavor;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default_file_names: HashMap<Flavor, Vec<String>>,
}

impl Config {
    /// The default file names for `flavor`, preferring a config
    /// override over [`Flavor::default_file_names`].
    pub fn default_file_names_for(&self, flavor: Flavor) -> Vec<String> {
        self.default_file_names
            .get(&flavor)
            .cloned()
            .unwrap_or_else(|| {
                flavor
                    .default_file_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            })
    }
}

pub async fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = crate::common::fs::read_to_string(path).await?;
    toml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("failed to parse config file '{}': {e}", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_flavor_falls_back_to_default() {
        let config = Config::default();
        assert_eq!(
            config.default_file_names_for(Flavor::Build),
            vec!["Dockerfile".to_string()]
        );
    }

    #[test]
    fn override_replaces_default() {
        let mut map = HashMap::new();
        map.insert(Flavor::Build, vec!["MyDockerfile".to_string()]);
        let config = Config {
            default_file_names: map,
        };
        assert_eq!(
            config.default_file_names_for(Flavor::Build),
            vec!["MyDockerfile".to_string()]
        );
    }

    #[test]
    fn parses_toml_with_overrides() {
        let text = r#"
            [default_file_names]
            Build = ["MyDockerfile"]
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(
            config.default_file_names_for(Flavor::Build),
            vec!["MyDockerfile".to_string()]
        );
    }
}
