use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::verify::{self, VerifyOptions};

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    /// Base directory the lockfile's recorded paths are relative to.
    #[clap(long = "base-dir", default_value = ".")]
    pub base_dir: PathBuf,

    /// Lockfile to verify against.
    #[clap(long = "lockfile-name", default_value = "docker-lock.json")]
    pub lockfile_name: String,

    /// Optional config file, parsed for validation; verify restricts
    /// discovery to the lockfile's recorded paths, so default file name
    /// overrides have no effect here.
    #[clap(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Optional `.env` file consulted for compose-file variable
    /// substitution.
    #[clap(long = "env-file")]
    pub env_file: Option<PathBuf>,

    /// Forward references with unresolvable digests instead of failing.
    #[clap(long = "ignore-missing-digests")]
    pub ignore_missing_digests: bool,

    /// Ignore tag drift; compare only name and digest.
    #[clap(long = "exclude-tags")]
    pub exclude_tags: bool,
}

pub async fn run(args: VerifyArgs) -> anyhow::Result<()> {
    crate::config::load(args.config_file.as_deref()).await?;

    let registry_config_path = registry_client::auth::default_config_path();
    let registry = Arc::new(registry_client::WrapperRegistry::discover(
        registry_config_path,
    ));

    let options = VerifyOptions {
        exclude_tags: args.exclude_tags,
        ignore_missing_digests: args.ignore_missing_digests,
        env_file: args.env_file.clone(),
    };

    verify::verify(args.base_dir.clone(), &args.lockfile_name, options, registry).await?;

    Ok(())
}
