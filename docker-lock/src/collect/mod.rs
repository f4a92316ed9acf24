//! Path Collector: enumerates manifest files of each flavor under a base
//! directory and emits a stream of [`PathRecord`]s.

pub mod path;

use std::path::{Path, PathBuf};

use crate::kind::Flavor;

/// Either a confirmed path for a flavor, or an error discovered while
/// enumerating (e.g. a path escaping the base directory).
#[derive(Debug, Clone)]
pub struct PathRecord {
    pub flavor: Flavor,
    pub path: PathBuf,
    pub error: Option<String>,
}

impl PathRecord {
    pub fn ok(flavor: Flavor, path: PathBuf) -> Self {
        PathRecord {
            flavor,
            path,
            error: None,
        }
    }

    pub fn err(flavor: Flavor, message: impl Into<String>) -> Self {
        PathRecord {
            flavor,
            path: PathBuf::new(),
            error: Some(message.into()),
        }
    }
}

/// Per-flavor input configuration for the collector (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct FlavorInput {
    pub paths: Vec<PathBuf>,
    pub globs: Vec<String>,
    pub recursive: bool,
    pub exclude: bool,
    /// Overrides [`Flavor::default_file_names`] when set, sourced from
    /// the optional TOML config file.
    pub default_file_names: Option<Vec<String>>,
}

impl FlavorInput {
    pub fn has_explicit_input(&self) -> bool {
        !self.paths.is_empty() || !self.globs.is_empty()
    }
}

/// Normalizes `candidate` relative to `base`, rejecting any path that
/// resolves outside it (spec §4.1 rule 3).
pub fn confine(base: &Path, candidate: &Path) -> Result<PathBuf, String> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };

    let normalized = normalize_lexically(&joined);
    let base_normalized = normalize_lexically(base);

    if normalized.starts_with(&base_normalized) {
        Ok(normalized
            .strip_prefix(&base_normalized)
            .unwrap_or(&normalized)
            .to_path_buf())
    } else {
        Err(format!(
            "path '{}' escapes base directory '{}'",
            candidate.display(),
            base.display()
        ))
    }
}

/// Lexical `..`/`.` resolution without touching the filesystem (the base
/// directory may not exist yet in tests, and we must not follow symlinks
/// here — this is a pure string-level confinement check).
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn confine_accepts_nested_path() {
        let base = Path::new("/tmp/project");
        let got = confine(base, Path::new("sub/Dockerfile")).unwrap();
        assert_eq!(got, PathBuf::from("sub/Dockerfile"));
    }

    #[test]
    fn confine_rejects_escape() {
        let base = Path::new("/tmp/project");
        assert!(confine(base, Path::new("../../Dockerfile")).is_err());
    }

    #[test]
    fn confine_rejects_escape_hidden_by_subsequent_descent() {
        let base = Path::new("/tmp/project");
        // lexically still escapes: ../../etc/passed/back/in
        assert!(confine(base, Path::new("../../etc/passwd")).is_err());
    }
}
