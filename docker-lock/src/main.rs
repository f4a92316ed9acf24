use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cmd::{Args, Subcommand};

mod cmd;
mod collect;
mod common;
mod config;
mod image;
mod kind;
mod lockfile;
mod parse;
mod pipeline;
mod update;
mod verify;

fn init_logger(log_level: Option<tracing::Level>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// `anyhow` prints a nicely formatted error message with `Debug`, so we
/// can return a result straight from `main`.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.log_level);

    match args.subcommand {
        Subcommand::Generate(args) => cmd::generate::run(args).await,
        Subcommand::Verify(args) => cmd::verify::run(args).await,
    }
}
