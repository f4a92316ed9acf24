//! Image Parser: demultiplexes [`PathRecord`]s by flavor to per-flavor
//! sub-parsers and multiplexes their [`ImageRef`] streams back out.

pub mod build;
pub mod compose;
pub mod workload;

use tokio::sync::{mpsc, watch};
use tracing::instrument;

use crate::collect::PathRecord;
use crate::image::ImageRef;
use crate::kind::Flavor;

/// Extra per-flavor knobs the dispatcher threads through to sub-parsers.
#[derive(Debug, Clone, Default)]
pub struct ParseConfig {
    pub env_file: Option<std::path::PathBuf>,
}

#[instrument(skip(paths_rx, images_tx, cancel, config))]
pub async fn dispatch(
    base: std::path::PathBuf,
    mut paths_rx: mpsc::Receiver<PathRecord>,
    images_tx: mpsc::Sender<ImageRef>,
    cancel: watch::Receiver<bool>,
    config: ParseConfig,
) {
    let mut tasks = tokio::task::JoinSet::new();

    loop {
        let record = tokio::select! {
            biased;
            _ = wait_tripped(cancel.clone()) => break,
            record = paths_rx.recv() => match record {
                Some(r) => r,
                None => break,
            },
        };

        if let Some(message) = record.error.clone() {
            let tx = images_tx.clone();
            tasks.spawn(async move {
                let _ = tx
                    .send(ImageRef::error(
                        record.flavor,
                        record.path.display().to_string(),
                        message,
                    ))
                    .await;
            });
            continue;
        }

        let tx = images_tx.clone();
        let base = base.clone();
        let cancel = cancel.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let result = match record.flavor {
                Flavor::Build => build::parse_file(&base, &record.path, None, &cancel, &tx).await,
                Flavor::Compose => {
                    compose::parse_file(&base, &record.path, &config, &cancel, &tx).await
                }
                Flavor::Workload => workload::parse_file(&base, &record.path, &cancel, &tx).await,
            };
            if let Err(message) = result {
                let _ = tx
                    .send(ImageRef::error(
                        record.flavor,
                        record.path.display().to_string(),
                        message,
                    ))
                    .await;
            }
        });
    }

    while tasks.join_next().await.is_some() {}
}

async fn wait_tripped(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
