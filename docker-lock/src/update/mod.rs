//! Digest Updater: coalesces duplicate `(name, tag)` lookups and fills
//! in missing digests via the registry client.

use std::collections::HashMap;
use std::sync::Arc;

use registry_client::WrapperRegistry;
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument};

use crate::image::ImageRef;

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateConfig {
    pub ignore_missing_digests: bool,
}

/// Drains `images_rx`, issues one digest lookup per distinct `(name,
/// tag)` key among references with an empty digest, and forwards every
/// reference (mutated copy with `digest` filled in, or unchanged) to
/// `out_tx`. On a fatal registry error it emits a single error-bearing
/// reference and stops (spec §4.3).
#[instrument(skip(images_rx, out_tx, registry, cancel))]
pub async fn run(
    mut images_rx: mpsc::Receiver<ImageRef>,
    out_tx: mpsc::Sender<ImageRef>,
    registry: Arc<WrapperRegistry>,
    config: UpdateConfig,
    mut cancel: watch::Receiver<bool>,
) {
    let mut pending: HashMap<(String, String), Vec<ImageRef>> = HashMap::new();
    let mut ready: Vec<ImageRef> = Vec::new();

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            item = images_rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        if item.is_err() || !item.digest.is_empty() {
            ready.push(item);
            continue;
        }

        pending.entry(item.lookup_key()).or_default().push(item);
    }

    debug!(
        lookups = pending.len(),
        refs = pending.values().map(Vec::len).sum::<usize>(),
        "coalesced digest lookups"
    );

    for item in ready {
        if send_or_stop(&out_tx, &mut cancel, item).await.is_break() {
            return;
        }
    }

    for ((name, tag), refs) in pending {
        if *cancel.borrow() {
            return;
        }
        match registry.digest(&name, &tag).await {
            Ok(digest) => {
                for mut item in refs {
                    item.digest = digest.clone();
                    if send_or_stop(&out_tx, &mut cancel, item).await.is_break() {
                        return;
                    }
                }
            }
            Err(e) => {
                if config.ignore_missing_digests {
                    for item in refs {
                        if send_or_stop(&out_tx, &mut cancel, item).await.is_break() {
                            return;
                        }
                    }
                } else {
                    let flavor = refs[0].flavor;
                    let path = refs[0].metadata.path().to_string();
                    let _ = out_tx
                        .send(ImageRef::error(
                            flavor,
                            path,
                            format!("failed to resolve digest for {name}:{tag}: {e}"),
                        ))
                        .await;
                    return;
                }
            }
        }
    }
}

async fn send_or_stop(
    tx: &mpsc::Sender<ImageRef>,
    cancel: &mut watch::Receiver<bool>,
    item: ImageRef,
) -> std::ops::ControlFlow<()> {
    tokio::select! {
        biased;
        _ = cancel.changed() => std::ops::ControlFlow::Break(()),
        result = tx.send(item) => {
            if result.is_ok() {
                std::ops::ControlFlow::Continue(())
            } else {
                std::ops::ControlFlow::Break(())
            }
        }
    }
}
