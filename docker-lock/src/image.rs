//! The central data model: image references and their placement metadata.

use crate::kind::Flavor;

/// Metadata identifying where in its source file an image reference was
/// found. Modeled as a sum type (spec §9 design note) rather than an
/// untyped map, since each flavor's attribute bag has a fixed shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageMetadata {
    Build(BuildMetadata),
    Compose(ComposeMetadata),
    Workload(WorkloadMetadata),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    pub path: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeMetadata {
    pub path: String,
    pub service_name: String,
    pub service_position: usize,
    pub build_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadMetadata {
    pub path: String,
    pub container_name: String,
    pub doc_position: usize,
    pub image_position: usize,
}

/// The flavor-specific sort key used by the Lockfile Assembler (spec
/// §4.4): `(path, position)` for Build, `(path, serviceName,
/// servicePosition)` for Compose, `(path, docPosition, imagePosition)`
/// for Workload. A variant per flavor rather than a fixed-shape tuple,
/// since Compose's key has a string component `position` doesn't.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Build(String, usize),
    Compose(String, String, usize),
    Workload(String, usize, usize),
}

impl ImageMetadata {
    pub fn path(&self) -> &str {
        match self {
            ImageMetadata::Build(m) => &m.path,
            ImageMetadata::Compose(m) => &m.path,
            ImageMetadata::Workload(m) => &m.path,
        }
    }

    /// The flavor-specific sort key used by the Lockfile Assembler
    /// (spec §4.4).
    pub fn sort_key(&self) -> SortKey {
        match self {
            ImageMetadata::Build(m) => SortKey::Build(m.path.clone(), m.position),
            ImageMetadata::Compose(m) => {
                SortKey::Compose(m.path.clone(), m.service_name.clone(), m.service_position)
            }
            ImageMetadata::Workload(m) => {
                SortKey::Workload(m.path.clone(), m.doc_position, m.image_position)
            }
        }
    }
}

/// A single parsed image reference, annotated with where it was found.
/// When `error` is set, every field but `flavor` is unspecified and the
/// reference is terminal for whichever stream carries it.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub flavor: Flavor,
    pub name: String,
    pub tag: String,
    pub digest: String,
    pub metadata: ImageMetadata,
    pub error: Option<String>,
}

impl ImageRef {
    pub fn error(flavor: Flavor, path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        ImageRef {
            flavor,
            name: String::new(),
            tag: String::new(),
            digest: String::new(),
            metadata: match flavor {
                Flavor::Build => ImageMetadata::Build(BuildMetadata { path, position: 0 }),
                Flavor::Compose => ImageMetadata::Compose(ComposeMetadata {
                    path,
                    service_name: String::new(),
                    service_position: 0,
                    build_path: None,
                }),
                Flavor::Workload => ImageMetadata::Workload(WorkloadMetadata {
                    path,
                    container_name: String::new(),
                    doc_position: 0,
                    image_position: 0,
                }),
            },
            error: Some(message.into()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// The digest-lookup coalescing key (spec §4.3): `(name, tag)`, never
    /// `name` alone.
    pub fn lookup_key(&self) -> (String, String) {
        (self.name.clone(), self.tag.clone())
    }
}

/// Splits an image line of the canonical form
/// `[host[:port]/]name[:tag][@algo:digest]` into `(name, tag, digest)`.
///
/// The tag/name split uses the last `:` found after the final `/` (if
/// any), so a registry port (`host:5000/name`) is never mistaken for a
/// tag separator. `tag` defaults to `"latest"` unless a digest was given
/// or the name is the sentinel `scratch`, matching spec §3's invariant.
pub fn parse_image_line(line: &str) -> (String, String, String) {
    let (rest, digest) = match line.split_once('@') {
        Some((rest, algo_digest)) => (
            rest,
            algo_digest
                .split_once(':')
                .map(|(_, d)| d.to_string())
                .unwrap_or_else(|| algo_digest.to_string()),
        ),
        None => (line, String::new()),
    };

    let last_slash = rest.rfind('/');
    let search_from = last_slash.map(|i| i + 1).unwrap_or(0);
    let tag_colon = rest[search_from..].rfind(':').map(|i| i + search_from);

    let (name, tag) = match tag_colon {
        Some(i) => (rest[..i].to_string(), rest[i + 1..].to_string()),
        None => (rest.to_string(), String::new()),
    };

    let tag = if !tag.is_empty() {
        tag
    } else if name == "scratch" {
        String::new()
    } else if !digest.is_empty() {
        String::new()
    } else {
        "latest".to_string()
    };

    (name, tag, digest)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_name_defaults_to_latest() {
        assert_eq!(
            parse_image_line("ubuntu"),
            ("ubuntu".into(), "latest".into(), "".into())
        );
    }

    #[test]
    fn name_with_tag() {
        assert_eq!(
            parse_image_line("golang:1.14"),
            ("golang".into(), "1.14".into(), "".into())
        );
    }

    #[test]
    fn scratch_has_no_tag() {
        assert_eq!(
            parse_image_line("scratch"),
            ("scratch".into(), "".into(), "".into())
        );
    }

    #[test]
    fn host_with_port_is_not_mistaken_for_tag() {
        assert_eq!(
            parse_image_line("localhost:5000/myimage"),
            ("localhost:5000/myimage".into(), "latest".into(), "".into())
        );
    }

    #[test]
    fn host_with_port_and_tag() {
        assert_eq!(
            parse_image_line("localhost:5000/myimage:v2"),
            ("localhost:5000/myimage".into(), "v2".into(), "".into())
        );
    }

    #[test]
    fn explicit_digest_with_no_tag_leaves_tag_empty() {
        let (name, tag, digest) = parse_image_line("redis@sha256:123abc");
        assert_eq!(name, "redis");
        assert_eq!(tag, "");
        assert_eq!(digest, "123abc");
    }

    #[test]
    fn tag_and_digest_together() {
        let (name, tag, digest) = parse_image_line("bash:v1@sha256:deadbeef");
        assert_eq!(name, "bash");
        assert_eq!(tag, "v1");
        assert_eq!(digest, "deadbeef");
    }
}
