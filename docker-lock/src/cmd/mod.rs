pub mod generate;
pub mod verify;

use clap::Parser;

use self::generate::GenerateArgs;
use self::verify::VerifyArgs;

/// Pins container images referenced by build, compose, and workload
/// manifests to content digests.
#[derive(Debug, Parser)]
#[clap(about, long_about = None, version)]
pub struct Args {
    /// Set the logging level. One of [off|error|warn|info|debug|trace].
    /// Defaults to info. You can also leave this unset and use the
    /// RUST_LOG env variable.
    #[clap(long = "log-level", global = true)]
    pub log_level: Option<tracing::Level>,

    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    /// Write a lockfile pinning every discovered image to its digest.
    Generate(GenerateArgs),

    /// Compare an existing lockfile against a fresh regenerate
    /// restricted to its recorded paths.
    Verify(VerifyArgs),
}
