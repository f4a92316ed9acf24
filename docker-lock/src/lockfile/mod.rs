//! Lockfile Assembler: groups resolved images by flavor and path, sorts
//! deterministically, and serializes the pretty-printed JSON lockfile.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::instrument;

use crate::image::{ImageMetadata, ImageRef};
use crate::kind::Flavor;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub tag: String,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl From<&ImageRef> for Record {
    fn from(image_ref: &ImageRef) -> Self {
        let (service, dockerfile, container) = match &image_ref.metadata {
            ImageMetadata::Build(_) => (None, None, None),
            ImageMetadata::Compose(m) => {
                (Some(m.service_name.clone()), m.build_path.clone(), None)
            }
            ImageMetadata::Workload(m) => (None, None, Some(m.container_name.clone())),
        };
        Record {
            name: image_ref.name.clone(),
            tag: image_ref.tag.clone(),
            digest: image_ref.digest.clone(),
            service,
            dockerfile,
            container,
        }
    }
}

/// `flavor → (path → ordered records)`, using `BTreeMap` so both the
/// in-memory structure and its JSON serialization are key-sorted and
/// therefore byte-deterministic across runs.
#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
pub struct Lockfile(pub BTreeMap<String, BTreeMap<String, Vec<Record>>>);

impl Lockfile {
    pub fn get(&self, flavor: Flavor, path: &str) -> Option<&[Record]> {
        self.0
            .get(flavor.wire_name())
            .and_then(|paths| paths.get(path))
            .map(Vec::as_slice)
    }

    pub fn paths(&self, flavor: Flavor) -> Vec<String> {
        self.0
            .get(flavor.wire_name())
            .map(|paths| paths.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Tab-indented pretty JSON, matching
    /// `json.MarshalIndent(l.images, "", "\t")` in the original.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(self, &mut ser)?;
        Ok(String::from_utf8(buf).expect("JSON output is valid UTF-8"))
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, Vec<Record>>> = serde_json::from_str(text)?;
        Ok(Lockfile(raw))
    }
}

/// Drains `images_rx` into a [`Lockfile`]. On the first error-bearing
/// reference, trips `cancel` and returns the error message (spec §4.5,
/// §7's in-band error propagation).
#[instrument(skip(images_rx, cancel))]
pub async fn assemble(
    mut images_rx: mpsc::Receiver<ImageRef>,
    cancel: watch::Sender<bool>,
) -> Result<Lockfile, String> {
    let mut grouped: HashMap<Flavor, HashMap<String, Vec<ImageRef>>> = HashMap::new();

    while let Some(item) = images_rx.recv().await {
        if let Some(message) = item.error {
            let _ = cancel.send(true);
            return Err(message);
        }
        let path = item.metadata.path().to_string();
        grouped
            .entry(item.flavor)
            .or_default()
            .entry(path)
            .or_default()
            .push(item);
    }

    let mut out: BTreeMap<String, BTreeMap<String, Vec<Record>>> = BTreeMap::new();
    for (flavor, by_path) in grouped {
        let mut paths_out = BTreeMap::new();
        for (path, mut refs) in by_path {
            refs.sort_by(|a, b| a.metadata.sort_key().cmp(&b.metadata.sort_key()));
            let normalized_path = crate::common::to_forward_slash(std::path::Path::new(&path));
            paths_out.insert(normalized_path, refs.iter().map(Record::from).collect());
        }
        out.insert(flavor.wire_name().to_string(), paths_out);
    }

    Ok(Lockfile(out))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::image::{BuildMetadata, ImageMetadata};

    fn build_ref(path: &str, position: usize, name: &str) -> ImageRef {
        ImageRef {
            flavor: Flavor::Build,
            name: name.to_string(),
            tag: "latest".to_string(),
            digest: "deadbeef".to_string(),
            metadata: ImageMetadata::Build(BuildMetadata {
                path: path.to_string(),
                position,
            }),
            error: None,
        }
    }

    #[tokio::test]
    async fn sorts_build_records_by_path_then_position() {
        let (tx, rx) = mpsc::channel(8);
        let (cancel_tx, _cancel_rx) = watch::channel(false);

        tx.send(build_ref("Dockerfile", 1, "b")).await.unwrap();
        tx.send(build_ref("Dockerfile", 0, "a")).await.unwrap();
        drop(tx);

        let lockfile = assemble(rx, cancel_tx).await.unwrap();
        let records = lockfile.get(Flavor::Build, "Dockerfile").unwrap();
        assert_eq!(records[0].name, "a");
        assert_eq!(records[1].name, "b");
    }

    #[tokio::test]
    async fn error_record_trips_cancellation() {
        let (tx, rx) = mpsc::channel(8);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        tx.send(ImageRef::error(Flavor::Build, "Dockerfile", "boom"))
            .await
            .unwrap();
        drop(tx);

        let result = assemble(rx, cancel_tx).await;
        assert!(result.is_err());
        assert!(*cancel_rx.borrow_and_update());
    }

    #[test]
    fn json_uses_tab_indentation() {
        let mut paths = BTreeMap::new();
        paths.insert(
            "Dockerfile".to_string(),
            vec![Record {
                name: "busybox".to_string(),
                tag: "latest".to_string(),
                digest: "deadbeef".to_string(),
                service: None,
                dockerfile: None,
                container: None,
            }],
        );
        let mut data = BTreeMap::new();
        data.insert("Dockerfile".to_string(), paths);
        let lockfile = Lockfile(data);

        let json = lockfile.to_json().unwrap();
        assert!(json.contains("\n\t\t{"));
    }

    #[test]
    fn lockfile_shape_json_snapshot() {
        let mut paths = BTreeMap::new();
        paths.insert(
            "Dockerfile".to_string(),
            vec![Record {
                name: "busybox".to_string(),
                tag: "latest".to_string(),
                digest: "deadbeef".to_string(),
                service: None,
                dockerfile: None,
                container: None,
            }],
        );
        let mut data = BTreeMap::new();
        data.insert("Dockerfile".to_string(), paths);
        let lockfile = Lockfile(data);

        insta::assert_json_snapshot!(lockfile, @r###"
        {
          "Dockerfile": {
            "Dockerfile": [
              {
                "name": "busybox",
                "tag": "latest",
                "digest": "deadbeef"
              }
            ]
          }
        }
        "###);
    }
}
