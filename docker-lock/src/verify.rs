//! Verifier: reruns the pipeline restricted to a recorded lockfile's
//! paths and diffs the regenerated result against it (spec §4.6).

use std::path::PathBuf;
use std::sync::Arc;

use registry_client::WrapperRegistry;

use crate::collect::FlavorInput;
use crate::kind::Flavor;
use crate::lockfile::{Lockfile, Record};
use crate::pipeline::{self, PipelineConfig};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read lockfile: {0}")]
    Read(#[from] anyhow::Error),
    #[error("failed to parse lockfile: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("pipeline error while regenerating: {0}")]
    Pipeline(#[from] pipeline::Error),
    #[error("verification failed:\n{0}")]
    Mismatch(String),
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub exclude_tags: bool,
    pub ignore_missing_digests: bool,
    pub env_file: Option<PathBuf>,
}

/// Loads the lockfile at `base/lockfile_name`, reruns the pipeline
/// restricted to exactly the recorded paths per flavor (no defaults, no
/// globs, no recursion), and compares element-wise by name, digest, and
/// (unless `exclude_tags`) tag.
pub async fn verify(
    base: PathBuf,
    lockfile_name: &str,
    options: VerifyOptions,
    registry: Arc<WrapperRegistry>,
) -> Result<(), Error> {
    let text =
        std::fs::read_to_string(base.join(lockfile_name)).map_err(|e| Error::Read(e.into()))?;
    let recorded = Lockfile::from_json(&text)?;

    let inputs = restricted_inputs(&recorded);
    let config = PipelineConfig {
        base: base.clone(),
        inputs,
        env_file: options.env_file,
        ignore_missing_digests: options.ignore_missing_digests,
    };

    let regenerated = pipeline::run(config, registry).await?;

    let mut mismatches = Vec::new();
    for flavor in Flavor::ALL {
        for path in recorded.paths(flavor) {
            let expected = recorded.get(flavor, &path).unwrap_or(&[]);
            let actual = regenerated.get(flavor, &path).unwrap_or(&[]);
            if !records_equal(expected, actual, options.exclude_tags) {
                mismatches.push(format!(
                    "{} {}: expected {:?}, got {:?}",
                    flavor, path, expected, actual
                ));
            }
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(Error::Mismatch(mismatches.join("\n")))
    }
}

fn records_equal(expected: &[Record], actual: &[Record], exclude_tags: bool) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    expected.iter().zip(actual.iter()).all(|(e, a)| {
        e.name == a.name && e.digest == a.digest && (exclude_tags || e.tag == a.tag)
    })
}

fn restricted_inputs(recorded: &Lockfile) -> [(Flavor, FlavorInput); 3] {
    let mut out: [(Flavor, FlavorInput); 3] = [
        (Flavor::Build, FlavorInput::default()),
        (Flavor::Compose, FlavorInput::default()),
        (Flavor::Workload, FlavorInput::default()),
    ];

    for slot in out.iter_mut() {
        let (flavor, input) = slot;
        let paths = recorded.paths(*flavor);
        if paths.is_empty() {
            input.exclude = true;
        } else {
            input.paths = paths.into_iter().map(PathBuf::from).collect();
            input.recursive = false;
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lockfile::Record;
    use std::collections::BTreeMap;

    fn record(name: &str, tag: &str, digest: &str) -> Record {
        Record {
            name: name.to_string(),
            tag: tag.to_string(),
            digest: digest.to_string(),
            service: None,
            dockerfile: None,
            container: None,
        }
    }

    #[test]
    fn equal_records_with_tags_considered() {
        let a = vec![record("busybox", "latest", "abc")];
        let b = vec![record("busybox", "latest", "abc")];
        assert!(records_equal(&a, &b, false));
    }

    #[test]
    fn tag_mismatch_fails_unless_excluded() {
        let a = vec![record("busybox", "latest", "abc")];
        let b = vec![record("busybox", "1.0", "abc")];
        assert!(!records_equal(&a, &b, false));
        assert!(records_equal(&a, &b, true));
    }

    #[test]
    fn restricted_inputs_excludes_flavors_absent_from_lockfile() {
        let mut paths = BTreeMap::new();
        paths.insert("Dockerfile".to_string(), vec![record("busybox", "latest", "abc")]);
        let mut data = BTreeMap::new();
        data.insert("Dockerfile".to_string(), paths);
        let lockfile = Lockfile(data);

        let inputs = restricted_inputs(&lockfile);
        let build = inputs.iter().find(|(f, _)| *f == Flavor::Build).unwrap();
        assert!(!build.1.exclude);
        assert_eq!(build.1.paths, vec![PathBuf::from("Dockerfile")]);

        let compose = inputs.iter().find(|(f, _)| *f == Flavor::Compose).unwrap();
        assert!(compose.1.exclude);
    }
}
