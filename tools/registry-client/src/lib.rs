//! Registry wrapper set: resolves `name:tag` to a content digest against
//! whichever registry the image name belongs to, selected by a
//! prefix-trie of wrapper plugins (spec §6, §9's "plugin set" note).

pub mod auth;
pub mod default;
pub mod ecr;
pub mod error;

use async_trait::async_trait;

/// An adapter handling one registry's authentication and digest
/// endpoint. `prefix()` is the registry-host prefix the wrapper
/// handles; the empty string marks the fallback/default wrapper.
#[async_trait]
pub trait RegistryWrapper: Send + Sync {
    fn prefix(&self) -> &str;

    async fn digest(&self, repo: &str, reference: &str) -> anyhow::Result<String>;
}

/// Selects the wrapper whose prefix is the longest match of an image
/// name's host, falling back to the wrapper registered with an empty
/// prefix.
pub struct WrapperRegistry {
    wrappers: Vec<Box<dyn RegistryWrapper>>,
}

impl WrapperRegistry {
    pub fn new(wrappers: Vec<Box<dyn RegistryWrapper>>) -> Self {
        WrapperRegistry { wrappers }
    }

    /// Builds the standard wrapper set: an [`ecr::EcrWrapper`] for any
    /// ECR endpoint discovered in the container-auth config (mirroring
    /// `original_source/cmd/generate/defaults.go`'s
    /// `DefaultWrapperManager`), plus the [`default::DefaultWrapper`]
    /// fallback.
    pub fn discover(config_path: Option<std::path::PathBuf>) -> Self {
        let mut wrappers: Vec<Box<dyn RegistryWrapper>> = Vec::new();

        if let Some(host) = ecr::discover_ecr_host(config_path.as_deref()) {
            wrappers.push(Box::new(ecr::EcrWrapper::new(host)));
        }

        wrappers.push(Box::new(default::DefaultWrapper::new(config_path)));
        WrapperRegistry::new(wrappers)
    }

    /// Splits `name` into `(host, repo)` the way Docker's reference
    /// grammar does: the segment before the first `/` is a host only if
    /// it contains a `.` or `:`, or is literally `localhost`.
    fn split_host(name: &str) -> (&str, &str) {
        match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first, rest)
            }
            _ => ("", name),
        }
    }

    fn select(&self, host: &str) -> &dyn RegistryWrapper {
        self.wrappers
            .iter()
            .filter(|w| !w.prefix().is_empty() && host.starts_with(w.prefix()))
            .max_by_key(|w| w.prefix().len())
            .or_else(|| self.wrappers.iter().find(|w| w.prefix().is_empty()))
            .map(|w| w.as_ref())
            .unwrap_or_else(|| {
                self.wrappers
                    .first()
                    .map(|w| w.as_ref())
                    .expect("at least one wrapper must be registered")
            })
    }

    pub async fn digest(&self, name: &str, tag: &str) -> anyhow::Result<String> {
        let (host, repo) = Self::split_host(name);
        let wrapper = self.select(host);
        let reference = if tag.is_empty() { "latest" } else { tag };
        wrapper.digest(repo, reference).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Stub(&'static str);

    #[async_trait]
    impl RegistryWrapper for Stub {
        fn prefix(&self) -> &str {
            self.0
        }

        async fn digest(&self, repo: &str, reference: &str) -> anyhow::Result<String> {
            Ok(format!("{}:{repo}:{reference}", self.0))
        }
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let registry = WrapperRegistry::new(vec![
            Box::new(Stub("")),
            Box::new(Stub("123456789012.dkr.ecr.us-east-1.amazonaws.com")),
        ]);

        let got = registry
            .digest(
                "123456789012.dkr.ecr.us-east-1.amazonaws.com/myrepo",
                "latest",
            )
            .await
            .unwrap();
        assert!(got.starts_with("123456789012.dkr.ecr.us-east-1.amazonaws.com:"));
    }

    #[tokio::test]
    async fn falls_back_to_default_for_unmatched_host() {
        let registry = WrapperRegistry::new(vec![
            Box::new(Stub("")),
            Box::new(Stub("123456789012.dkr.ecr.us-east-1.amazonaws.com")),
        ]);

        let got = registry.digest("busybox", "latest").await.unwrap();
        assert!(got.starts_with(':'));
    }

    #[test]
    fn splits_host_with_port() {
        assert_eq!(
            WrapperRegistry::split_host("localhost:5000/myimage"),
            ("localhost:5000", "myimage")
        );
    }

    #[test]
    fn splits_plain_name_with_no_host() {
        assert_eq!(WrapperRegistry::split_host("busybox"), ("", "busybox"));
    }
}
