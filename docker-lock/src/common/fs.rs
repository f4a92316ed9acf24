//! Async filesystem wrappers that attach the offending path to errors.

use std::path::Path;

use anyhow::{Context, Result};

pub async fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))
}

pub async fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write '{}'", path.display()))
}

pub async fn metadata(path: impl AsRef<Path>) -> Result<std::fs::Metadata> {
    let path = path.as_ref();
    tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat '{}'", path.display()))
}
