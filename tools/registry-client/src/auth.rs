//! Loading credentials from the host's container-auth configuration file
//! (`~/.docker/config.json`), the same file
//! `original_source/cmd/generate/defaults.go`'s `DefaultConfigPath`
//! points at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{self, Error};

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct AuthEntry {
    auth: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The default container-auth config path, or `None` when it does not
/// exist (mirrors `DefaultConfigPath`'s "return empty string" behavior
/// rather than erroring).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    let path = home.join(".docker").join("config.json");
    path.exists().then_some(path)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Looks up credentials for `host` (e.g. `index.docker.io`,
/// `123456789012.dkr.ecr.us-east-1.amazonaws.com`) in the config file at
/// `path`, if one is given.
pub fn credentials_for_host(
    path: Option<&Path>,
    host: &str,
) -> Result<Option<Credentials>, Error> {
    let Some(path) = path else {
        return Ok(None);
    };

    let text = std::fs::read_to_string(path).context(error::ReadAuthConfigSnafu {
        path: path.display().to_string(),
    })?;
    let config: ConfigFile = serde_json::from_str(&text).context(error::ParseAuthConfigSnafu {
        path: path.display().to_string(),
    })?;

    let Some(entry) = config.auths.get(host) else {
        return Ok(None);
    };
    let Some(encoded) = &entry.auth else {
        return Ok(None);
    };

    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context(error::DecodeAuthEntrySnafu {
            host: host.to_string(),
        })?;
    let decoded = String::from_utf8_lossy(&decoded);
    let Some((username, password)) = decoded.split_once(':') else {
        return Ok(None);
    };

    Ok(Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }))
}
