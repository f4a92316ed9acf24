//! Workload-file (Kubernetes-shaped) sub-parser.

use std::path::Path;

use serde::Deserialize as _;
use serde_yaml::Value;
use tokio::sync::{mpsc, watch};

use crate::common::fs;
use crate::image::{ImageMetadata, ImageRef, WorkloadMetadata};
use crate::kind::Flavor;

/// Splits multi-document YAML, walks each document depth-first, and
/// emits one reference per object that simultaneously carries a `name`
/// and an `image` scalar (spec §4.2).
pub async fn parse_file(
    base: &Path,
    relative_path: &Path,
    cancel: &watch::Receiver<bool>,
    tx: &mpsc::Sender<ImageRef>,
) -> Result<(), String> {
    let full = base.join(relative_path);
    let text = fs::read_to_string(&full).await.map_err(|e| e.to_string())?;
    let path_string = crate::common::to_forward_slash(relative_path);

    let refs = parse_text(&text, &path_string)?;
    for image_ref in refs {
        if *cancel.borrow() {
            return Ok(());
        }
        if tx.send(image_ref).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}

pub fn parse_text(text: &str, path: &str) -> Result<Vec<ImageRef>, String> {
    let mut out = Vec::new();

    for (doc_position, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document)
            .map_err(|e| format!("{path}: invalid workload document {doc_position}: {e}"))?;
        if value.is_null() {
            continue;
        }
        validate_schema(&value, path, doc_position)?;
        let mut image_position = 0usize;
        walk(&value, path, doc_position, &mut image_position, &mut out);
    }

    Ok(out)
}

/// Gates a document on carrying the two fields every Kubernetes-shaped
/// workload object has: `apiVersion` and `kind`. Stands in for the
/// original's `scheme.Codecs.UniversalDeserializer().Decode` (spec §7's
/// "schema-invalid workload documents" case), since this crate has no
/// registry of known API types to decode against.
fn validate_schema(value: &Value, path: &str, doc_position: usize) -> Result<(), String> {
    let map = value.as_mapping().ok_or_else(|| {
        format!("{path}: workload document {doc_position} is not a mapping")
    })?;

    let has_field = |field: &str| {
        map.get(Value::String(field.to_string()))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };

    if !has_field("apiVersion") || !has_field("kind") {
        return Err(format!(
            "{path}: workload document {doc_position} is missing apiVersion/kind"
        ));
    }

    Ok(())
}

fn walk(
    value: &Value,
    path: &str,
    doc_position: usize,
    image_position: &mut usize,
    out: &mut Vec<ImageRef>,
) {
    match value {
        Value::Mapping(map) => {
            let name = map
                .get(Value::String("name".to_string()))
                .and_then(Value::as_str);
            let image = map
                .get(Value::String("image".to_string()))
                .and_then(Value::as_str);

            if let (Some(name), Some(image)) = (name, image) {
                let (img_name, tag, digest) = crate::image::parse_image_line(image);
                out.push(ImageRef {
                    flavor: Flavor::Workload,
                    name: img_name,
                    tag,
                    digest,
                    metadata: ImageMetadata::Workload(WorkloadMetadata {
                        path: path.to_string(),
                        container_name: name.to_string(),
                        doc_position,
                        image_position: *image_position,
                    }),
                    error: None,
                });
                *image_position += 1;
            }

            for (_, v) in map.iter() {
                walk(v, path, doc_position, image_position, out);
            }
        }
        Value::Sequence(seq) => {
            for item in seq {
                walk(item, path, doc_position, image_position, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_s4_workload_multi_doc() {
        let text = "\
apiVersion: v1
kind: Pod
spec:
  containers:
    - name: a
      image: busybox
    - name: b
      image: golang
---
apiVersion: v1
kind: Pod
spec:
  containers:
    - name: c
      image: redis:1.0@sha256:123
    - name: d
      image: bash:v1
";
        let refs = parse_text(text, "T/pods.yml").unwrap();
        assert_eq!(refs.len(), 4);

        let meta = |r: &ImageRef| match &r.metadata {
            ImageMetadata::Workload(m) => (m.doc_position, m.image_position),
            _ => panic!(),
        };

        assert_eq!(refs[0].name, "busybox");
        assert_eq!(meta(&refs[0]), (0, 0));
        assert_eq!(refs[1].name, "golang");
        assert_eq!(meta(&refs[1]), (0, 1));
        assert_eq!(refs[2].name, "redis");
        assert_eq!(refs[2].tag, "1.0");
        assert_eq!(refs[2].digest, "123");
        assert_eq!(meta(&refs[2]), (1, 0));
        assert_eq!(refs[3].name, "bash");
        assert_eq!(refs[3].tag, "v1");
        assert_eq!(meta(&refs[3]), (1, 1));
    }

    #[test]
    fn rejects_document_missing_api_version_and_kind() {
        let text = "\
name: not-a-workload
image: busybox
";
        let err = parse_text(text, "T/stray.yml").unwrap_err();
        assert!(err.contains("missing apiVersion/kind"), "{err}");
    }

    #[test]
    fn rejects_document_missing_kind_only() {
        let text = "\
apiVersion: v1
containers:
  - name: a
    image: busybox
";
        let err = parse_text(text, "T/partial.yml").unwrap_err();
        assert!(err.contains("missing apiVersion/kind"), "{err}");
    }
}
