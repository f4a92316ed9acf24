//! Small helpers shared across the pipeline stages.

pub mod fs;

/// Normalizes a path to forward-slash form regardless of host separator,
/// as required for lockfile keys and sort comparisons (spec §4.4).
pub fn to_forward_slash(path: &std::path::Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;

    #[test]
    fn normalizes_components() {
        assert_eq!(to_forward_slash(Path::new("a/b/c")), "a/b/c");
    }
}
