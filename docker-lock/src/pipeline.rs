//! Pipeline Driver: composes the four stages with a shared cancellation
//! signal (spec §4.5).

use std::path::PathBuf;
use std::sync::Arc;

use registry_client::WrapperRegistry;
use tokio::sync::{mpsc, watch};
use tracing::instrument;

use crate::collect::{self, FlavorInput};
use crate::kind::Flavor;
use crate::lockfile::{self, Lockfile};
use crate::parse::{self, ParseConfig};
use crate::update::{self, UpdateConfig};

const CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input error: {0}")]
    InputShape(String),
    #[error("{0}")]
    Pipeline(String),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base: PathBuf,
    pub inputs: [(Flavor, FlavorInput); 3],
    pub env_file: Option<PathBuf>,
    pub ignore_missing_digests: bool,
}

/// Runs the Path Collector, Image Parser, Digest Updater, and Lockfile
/// Assembler as concurrent tasks joined over bounded channels, all
/// observing one shared `watch`-based cancellation signal.
#[instrument(skip(config, registry))]
pub async fn run(config: PipelineConfig, registry: Arc<WrapperRegistry>) -> Result<Lockfile, Error> {
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let (paths_tx, paths_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (images_tx, images_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (updated_tx, updated_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let collect_handle = tokio::spawn(collect::path::collect(
        config.base.clone(),
        config.inputs.clone(),
        paths_tx,
        cancel_rx.clone(),
    ));

    let parse_handle = tokio::spawn(parse::dispatch(
        config.base.clone(),
        paths_rx,
        images_tx,
        cancel_rx.clone(),
        ParseConfig {
            env_file: config.env_file.clone(),
        },
    ));

    let update_handle = tokio::spawn(update::run(
        images_rx,
        updated_tx,
        registry,
        UpdateConfig {
            ignore_missing_digests: config.ignore_missing_digests,
        },
        cancel_rx.clone(),
    ));

    let assemble_handle = tokio::spawn(lockfile::assemble(updated_rx, cancel_tx));

    let (collect_result, parse_result, update_result, assemble_result) =
        tokio::join!(collect_handle, parse_handle, update_handle, assemble_handle);

    collect_result.map_err(|e| Error::Pipeline(e.to_string()))?;
    parse_result.map_err(|e| Error::Pipeline(e.to_string()))?;
    update_result.map_err(|e| Error::Pipeline(e.to_string()))?;

    assemble_result
        .map_err(|e| Error::Pipeline(e.to_string()))?
        .map_err(Error::Pipeline)
}

#[cfg(test)]
mod test {
    use super::*;
    use registry_client::RegistryWrapper;
    use tempfile::tempdir;

    struct StubWrapper;

    #[async_trait::async_trait]
    impl RegistryWrapper for StubWrapper {
        fn prefix(&self) -> &str {
            ""
        }

        async fn digest(&self, _repo: &str, _reference: &str) -> anyhow::Result<String> {
            Ok("deadbeef".to_string())
        }
    }

    #[tokio::test]
    async fn generates_lockfile_for_simple_build_file() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("Dockerfile"), "FROM busybox")
            .await
            .unwrap();

        let registry = Arc::new(WrapperRegistry::new(vec![Box::new(StubWrapper)]));
        let config = PipelineConfig {
            base: dir.path().to_path_buf(),
            inputs: [
                (Flavor::Build, FlavorInput::default()),
                (Flavor::Compose, FlavorInput { exclude: true, ..Default::default() }),
                (Flavor::Workload, FlavorInput { exclude: true, ..Default::default() }),
            ],
            env_file: None,
            ignore_missing_digests: false,
        };

        let lockfile = run(config, registry).await.unwrap();
        let records = lockfile.get(Flavor::Build, "Dockerfile").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "busybox");
        assert_eq!(records[0].digest, "deadbeef");
    }

    #[tokio::test]
    async fn scenario_s6_path_escape_is_rejected_before_digest_lookup() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(WrapperRegistry::new(vec![Box::new(StubWrapper)]));
        let config = PipelineConfig {
            base: dir.path().to_path_buf(),
            inputs: [
                (
                    Flavor::Build,
                    FlavorInput {
                        paths: vec![PathBuf::from("../../Dockerfile")],
                        ..Default::default()
                    },
                ),
                (Flavor::Compose, FlavorInput { exclude: true, ..Default::default() }),
                (Flavor::Workload, FlavorInput { exclude: true, ..Default::default() }),
            ],
            env_file: None,
            ignore_missing_digests: false,
        };

        let result = run(config, registry).await;
        assert!(result.is_err());
    }
}
