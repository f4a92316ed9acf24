use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::collect::FlavorInput;
use crate::config::Config;
use crate::kind::Flavor;
use crate::pipeline::{self, PipelineConfig};

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Base directory manifests are discovered under and lockfile paths
    /// are relative to.
    #[clap(long = "base-dir", default_value = ".")]
    pub base_dir: PathBuf,

    /// Output lockfile name. Must be relative and contain no path
    /// separators.
    #[clap(long = "lockfile-name", default_value = "docker-lock.json")]
    pub lockfile_name: String,

    /// Optional TOML config file providing per-flavor default file name
    /// overrides.
    #[clap(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Optional `.env` file consulted for compose-file variable
    /// substitution; defaults to `.env` next to each compose file.
    #[clap(long = "env-file")]
    pub env_file: Option<PathBuf>,

    /// Forward references with unresolvable digests instead of failing.
    #[clap(long = "ignore-missing-digests")]
    pub ignore_missing_digests: bool,

    #[clap(long = "dockerfile", value_name = "PATH")]
    pub build_paths: Vec<PathBuf>,
    #[clap(long = "dockerfile-glob", value_name = "GLOB")]
    pub build_globs: Vec<String>,
    #[clap(long = "dockerfile-recursive")]
    pub build_recursive: bool,
    #[clap(long = "exclude-dockerfiles")]
    pub build_exclude: bool,

    #[clap(long = "compose-file", value_name = "PATH")]
    pub compose_paths: Vec<PathBuf>,
    #[clap(long = "compose-file-glob", value_name = "GLOB")]
    pub compose_globs: Vec<String>,
    #[clap(long = "compose-file-recursive")]
    pub compose_recursive: bool,
    #[clap(long = "exclude-composefiles")]
    pub compose_exclude: bool,

    #[clap(long = "workload-file", value_name = "PATH")]
    pub workload_paths: Vec<PathBuf>,
    #[clap(long = "workload-file-glob", value_name = "GLOB")]
    pub workload_globs: Vec<String>,
    #[clap(long = "workload-file-recursive")]
    pub workload_recursive: bool,
    #[clap(long = "exclude-workloadfiles")]
    pub workload_exclude: bool,
}

impl GenerateArgs {
    fn inputs(&self, config: &Config) -> [(Flavor, FlavorInput); 3] {
        [
            (
                Flavor::Build,
                FlavorInput {
                    paths: self.build_paths.clone(),
                    globs: self.build_globs.clone(),
                    recursive: self.build_recursive,
                    exclude: self.build_exclude,
                    default_file_names: Some(config.default_file_names_for(Flavor::Build)),
                },
            ),
            (
                Flavor::Compose,
                FlavorInput {
                    paths: self.compose_paths.clone(),
                    globs: self.compose_globs.clone(),
                    recursive: self.compose_recursive,
                    exclude: self.compose_exclude,
                    default_file_names: Some(config.default_file_names_for(Flavor::Compose)),
                },
            ),
            (
                Flavor::Workload,
                FlavorInput {
                    paths: self.workload_paths.clone(),
                    globs: self.workload_globs.clone(),
                    recursive: self.workload_recursive,
                    exclude: self.workload_exclude,
                    default_file_names: Some(config.default_file_names_for(Flavor::Workload)),
                },
            ),
        ]
    }
}

/// Validates the lockfile name is relative and separator-free (spec
/// §6), an input-shape error surfaced before the pipeline starts.
fn validate_lockfile_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty()
        || PathBuf::from(name).is_absolute()
        || name.contains('/')
        || name.contains('\\')
    {
        anyhow::bail!("lockfile name '{name}' must be relative and contain no path separators");
    }
    Ok(())
}

pub async fn run(args: GenerateArgs) -> anyhow::Result<()> {
    validate_lockfile_name(&args.lockfile_name)?;

    let docker_lock_config = crate::config::load(args.config_file.as_deref()).await?;

    let registry_config_path = registry_client::auth::default_config_path();
    let registry = Arc::new(registry_client::WrapperRegistry::discover(
        registry_config_path,
    ));

    let config = PipelineConfig {
        base: args.base_dir.clone(),
        inputs: args.inputs(&docker_lock_config),
        env_file: args.env_file.clone(),
        ignore_missing_digests: args.ignore_missing_digests,
    };

    let lockfile = pipeline::run(config, registry).await?;
    let json = lockfile.to_json()?;
    crate::common::fs::write(args.base_dir.join(&args.lockfile_name), json).await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_absolute_lockfile_name() {
        assert!(validate_lockfile_name("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_lockfile_name_with_separator() {
        assert!(validate_lockfile_name("sub/lock.json").is_err());
    }

    #[test]
    fn accepts_plain_name() {
        assert!(validate_lockfile_name("docker-lock.json").is_ok());
    }
}
