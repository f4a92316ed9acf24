//! The three manifest flavors docker-lock recognizes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of manifest an image reference or path record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flavor {
    Build,
    Compose,
    Workload,
}

impl Flavor {
    pub const ALL: [Flavor; 3] = [Flavor::Build, Flavor::Compose, Flavor::Workload];

    /// The wire-format key used in the lockfile JSON. Part of the external
    /// contract; must not change.
    pub fn wire_name(self) -> &'static str {
        match self {
            Flavor::Build => "Dockerfile",
            Flavor::Compose => "Composefile",
            Flavor::Workload => "Kubernetesfile",
        }
    }

    /// Canonical default manifest file names searched when the user gives
    /// no explicit paths or globs for this flavor.
    pub fn default_file_names(self) -> &'static [&'static str] {
        match self {
            Flavor::Build => &["Dockerfile"],
            Flavor::Compose => &["docker-compose.yml", "docker-compose.yaml"],
            Flavor::Workload => &[
                "deployment.yml",
                "deployment.yaml",
                "pod.yml",
                "pod.yaml",
                "job.yml",
                "job.yaml",
            ],
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_names_are_fixed() {
        assert_eq!(Flavor::Build.wire_name(), "Dockerfile");
        assert_eq!(Flavor::Compose.wire_name(), "Composefile");
        assert_eq!(Flavor::Workload.wire_name(), "Kubernetesfile");
    }

    #[test]
    fn default_names_cover_canonical_files() {
        assert!(Flavor::Compose
            .default_file_names()
            .contains(&"docker-compose.yml"));
    }
}
