//! Per-flavor path enumeration and fan-out into a single paths channel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_walkdir::WalkDir;
use futures::StreamExt;
use globset::{Glob, GlobSetBuilder};
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument};

use super::{confine, FlavorInput, PathRecord};
use crate::kind::Flavor;

/// Enumerates manifest paths for every flavor and sends [`PathRecord`]s
/// to `tx` until every flavor's walk completes or cancellation trips.
/// Mirrors the original collector's one-goroutine-per-flavor fan-out
/// into a single shared channel.
#[instrument(skip(inputs, tx, cancel))]
pub async fn collect(
    base: PathBuf,
    inputs: [(Flavor, FlavorInput); 3],
    tx: mpsc::Sender<PathRecord>,
    cancel: watch::Receiver<bool>,
) {
    let mut tasks = tokio::task::JoinSet::new();

    for (flavor, input) in inputs {
        if input.exclude {
            continue;
        }
        let base = base.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            collect_flavor(base, flavor, input, tx, cancel).await;
        });
    }

    while tasks.join_next().await.is_some() {}
}

async fn collect_flavor(
    base: PathBuf,
    flavor: Flavor,
    input: FlavorInput,
    tx: mpsc::Sender<PathRecord>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut seen: HashSet<PathBuf> = HashSet::new();

    if input.has_explicit_input() {
        for p in &input.paths {
            match confine(&base, p) {
                Ok(normalized) => {
                    if seen.insert(normalized.clone()) {
                        if !send_or_stop(&tx, &mut cancel, PathRecord::ok(flavor, normalized))
                            .await
                        {
                            return;
                        }
                    }
                }
                Err(message) => {
                    let _ = send_or_stop(&tx, &mut cancel, PathRecord::err(flavor, message)).await;
                    return;
                }
            }
        }

        if !input.globs.is_empty() {
            let mut builder = GlobSetBuilder::new();
            for pattern in &input.globs {
                match Glob::new(pattern) {
                    Ok(g) => {
                        builder.add(g);
                    }
                    Err(e) => {
                        let _ = send_or_stop(
                            &tx,
                            &mut cancel,
                            PathRecord::err(flavor, format!("invalid glob '{pattern}': {e}")),
                        )
                        .await;
                        return;
                    }
                }
            }
            let set = match builder.build() {
                Ok(s) => s,
                Err(e) => {
                    let _ = send_or_stop(
                        &tx,
                        &mut cancel,
                        PathRecord::err(flavor, format!("invalid glob set: {e}")),
                    )
                    .await;
                    return;
                }
            };

            let mut entries = WalkDir::new(&base);
            loop {
                if *cancel.borrow() {
                    return;
                }
                match entries.next().await {
                    Some(Ok(entry)) => {
                        let path = entry.path();
                        let is_file = entry
                            .file_type()
                            .await
                            .map(|t| t.is_file())
                            .unwrap_or(false);
                        if !is_file {
                            continue;
                        }
                        let relative = path.strip_prefix(&base).unwrap_or(&path);
                        if set.is_match(relative) {
                            match confine(&base, relative) {
                                Ok(normalized) => {
                                    if seen.insert(normalized.clone())
                                        && !send_or_stop(
                                            &tx,
                                            &mut cancel,
                                            PathRecord::ok(flavor, normalized),
                                        )
                                        .await
                                    {
                                        return;
                                    }
                                }
                                Err(message) => {
                                    let _ = send_or_stop(
                                        &tx,
                                        &mut cancel,
                                        PathRecord::err(flavor, message),
                                    )
                                    .await;
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = send_or_stop(
                            &tx,
                            &mut cancel,
                            PathRecord::err(flavor, format!("walk error: {e}")),
                        )
                        .await;
                        return;
                    }
                    None => break,
                }
            }
        }

        return;
    }

    // No explicit input: fall back to default file names, recursing if
    // requested.
    let owned_defaults;
    let defaults: &[&str] = match &input.default_file_names {
        Some(names) => {
            owned_defaults = names.iter().map(String::as_str).collect::<Vec<_>>();
            &owned_defaults
        }
        None => flavor.default_file_names(),
    };

    if input.recursive {
        let mut entries = WalkDir::new(&base);
        loop {
            if *cancel.borrow() {
                return;
            }
            match entries.next().await {
                Some(Ok(entry)) => {
                    let is_file = entry
                        .file_type()
                        .await
                        .map(|t| t.is_file())
                        .unwrap_or(false);
                    if !is_file {
                        continue;
                    }
                    let matches_default = entry
                        .path()
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| defaults.contains(&n))
                        .unwrap_or(false);
                    if !matches_default {
                        continue;
                    }
                    let path = entry.path();
                    let relative = path.strip_prefix(&base).unwrap_or(&path);
                    match confine(&base, relative) {
                        Ok(normalized) => {
                            if seen.insert(normalized.clone())
                                && !send_or_stop(
                                    &tx,
                                    &mut cancel,
                                    PathRecord::ok(flavor, normalized),
                                )
                                .await
                            {
                                return;
                            }
                        }
                        Err(message) => {
                            let _ =
                                send_or_stop(&tx, &mut cancel, PathRecord::err(flavor, message))
                                    .await;
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = send_or_stop(
                        &tx,
                        &mut cancel,
                        PathRecord::err(flavor, format!("walk error: {e}")),
                    )
                    .await;
                    return;
                }
                None => break,
            }
        }
    } else {
        for name in defaults {
            let candidate: &Path = Path::new(name);
            let full = base.join(candidate);
            if crate::common::fs::metadata(&full).await.is_ok() {
                if seen.insert(candidate.to_path_buf())
                    && !send_or_stop(
                        &tx,
                        &mut cancel,
                        PathRecord::ok(flavor, candidate.to_path_buf()),
                    )
                    .await
                {
                    return;
                }
            } else {
                debug!(file = name, "default manifest absent, skipping");
            }
        }
    }
}

/// Sends one record, returning `false` if cancellation tripped while
/// waiting (spec §5's "non-blocking check paired with every blocking
/// operation").
async fn send_or_stop(
    tx: &mpsc::Sender<PathRecord>,
    cancel: &mut watch::Receiver<bool>,
    record: PathRecord,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.changed() => false,
        result = tx.send(record) => result.is_ok(),
    }
}
