//! AWS ECR wrapper. See DESIGN.md for the Open Question decision on
//! token acquisition (SDK `GetAuthorizationToken`, not CLI shell-out).

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};

use crate::error::{self, Error};
use crate::RegistryWrapper;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    auths: std::collections::HashMap<String, serde_json::Value>,
}

/// Scans the container-auth config for a host ending in
/// `.amazonaws.com` whose name contains `.dkr.ecr.`, the same lookup
/// `original_source/pkg/generate/registry/contrib/ecr.go`'s
/// `loadECREndpoint` performs against `~/.docker/config.json`.
pub fn discover_ecr_host(config_path: Option<&Path>) -> Option<String> {
    let path = config_path?;
    let text = std::fs::read_to_string(path).ok()?;
    let config: ConfigFile = serde_json::from_str(&text).ok()?;
    config
        .auths
        .keys()
        .find(|host| host.ends_with(".amazonaws.com") && host.contains(".dkr.ecr."))
        .cloned()
}

/// Extracts the AWS region from an ECR host of the shape
/// `<account-id>.dkr.ecr.<region>.amazonaws.com` (the 4th dot-separated
/// segment, as the original's `loadECREndpoint` derives it).
fn region_from_host(host: &str) -> Result<String, Error> {
    host.split('.')
        .nth(3)
        .map(str::to_string)
        .context(error::EcrHostShapeSnafu {
            host: host.to_string(),
        })
}

pub struct EcrWrapper {
    host: String,
}

impl EcrWrapper {
    pub fn new(host: String) -> Self {
        EcrWrapper { host }
    }

    async fn registry_password(&self) -> anyhow::Result<(String, String)> {
        let region = region_from_host(&self.host)?;
        let region_provider = aws_config::Region::new(region);
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let client = aws_sdk_ecr::Client::new(&sdk_config);

        let registry_id = self.host.split('.').next().unwrap_or_default().to_string();

        let response = client
            .get_authorization_token()
            .registry_ids(registry_id.clone())
            .send()
            .await
            .context(error::EcrAuthSnafu)?;

        let data = response
            .authorization_data()
            .first()
            .context(error::EcrNoAuthDataSnafu {
                registry_id: registry_id.clone(),
            })?;
        let token = data.authorization_token().unwrap_or_default();

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|e| anyhow::anyhow!("failed to decode ECR authorization token: {e}"))?;
        let decoded = String::from_utf8_lossy(&decoded);
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("ECR authorization token had unexpected shape"))?;

        Ok((username.to_string(), password.to_string()))
    }
}

#[async_trait]
impl RegistryWrapper for EcrWrapper {
    fn prefix(&self) -> &str {
        &self.host
    }

    async fn digest(&self, repo: &str, reference: &str) -> anyhow::Result<String> {
        let (username, password) = self.registry_password().await?;

        let client = reqwest::Client::new();
        let url = format!("https://{}/v2/{repo}/manifests/{reference}", self.host);

        let response = client
            .head(&url)
            .basic_auth(username, Some(password))
            .header(
                reqwest::header::ACCEPT,
                "application/vnd.docker.distribution.manifest.v2+json",
            )
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("ECR registry returned status {} for {url}", response.status());
        }

        response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(|d| d.split_once(':').map(|(_, h)| h.to_string()).unwrap_or_else(|| d.to_string()))
            .ok_or_else(|| anyhow::anyhow!("ECR manifest response for {repo}:{reference} carried no digest header"))
    }
}
