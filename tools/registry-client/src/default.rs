//! Default wrapper: speaks the Docker Registry HTTP API v2 manifest
//! endpoint directly over `reqwest`, handling bearer-token exchange and
//! falling back to a canonical-JSON SHA-256 when the registry omits the
//! `Docker-Content-Digest` header.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use sha2::{Digest as _, Sha256};
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use crate::auth;
use crate::error::{self, Error};
use crate::RegistryWrapper;

const MANIFEST_MEDIA_TYPES: &str = concat!(
    "application/vnd.docker.distribution.manifest.v2+json,",
    "application/vnd.docker.distribution.manifest.list.v2+json,",
    "application/vnd.oci.image.manifest.v1+json,",
    "application/vnd.oci.image.index.v1+json"
);

/// Talks to `registry-1.docker.io` (or whatever base URL is configured)
/// over HTTPS, authenticating via the standard Docker bearer-token
/// handshake.
pub struct DefaultWrapper {
    client: reqwest::Client,
    base_url: String,
    config_path: Option<PathBuf>,
    token_cache: Mutex<std::collections::HashMap<String, String>>,
}

impl DefaultWrapper {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        DefaultWrapper {
            client: reqwest::Client::new(),
            base_url: "https://registry-1.docker.io".to_string(),
            config_path,
            token_cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Docker Hub's single-name repos are implicitly namespaced under
    /// `library/`.
    fn canonical_repo(repo: &str) -> String {
        if repo.contains('/') {
            repo.to_string()
        } else {
            format!("library/{repo}")
        }
    }

    async fn bearer_token(&self, repo: &str, challenge: &str) -> Result<String, Error> {
        if let Some(cached) = self.token_cache.lock().unwrap().get(repo) {
            return Ok(cached.clone());
        }

        let (realm, params) = parse_www_authenticate(challenge);
        let mut request = self.client.get(&realm);
        for (key, value) in &params {
            request = request.query(&[(key.as_str(), value.as_str())]);
        }

        let host = self
            .base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        if let Ok(Some(creds)) = auth::credentials_for_host(self.config_path.as_deref(), host) {
            request = request.basic_auth(creds.username, Some(creds.password));
        }

        let response = request
            .send()
            .await
            .context(error::TokenExchangeSnafu { url: realm.clone() })?;
        let body: serde_json::Value = response
            .json()
            .await
            .context(error::TokenExchangeSnafu { url: realm })?;

        let token = body
            .get("token")
            .or_else(|| body.get("access_token"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        self.token_cache
            .lock()
            .unwrap()
            .insert(repo.to_string(), token.clone());
        Ok(token)
    }
}

fn parse_www_authenticate(header: &str) -> (String, Vec<(String, String)>) {
    let rest = header.trim_start_matches("Bearer ");
    let mut realm = String::new();
    let mut params = Vec::new();
    for part in rest.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            let value = value.trim_matches('"').to_string();
            if key == "realm" {
                realm = value;
            } else {
                params.push((key.to_string(), value));
            }
        }
    }
    (realm, params)
}

#[async_trait]
impl RegistryWrapper for DefaultWrapper {
    fn prefix(&self) -> &str {
        ""
    }

    async fn digest(&self, repo: &str, reference: &str) -> anyhow::Result<String> {
        let repo = Self::canonical_repo(repo);
        let url = format!("{}/v2/{repo}/manifests/{reference}", self.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, MANIFEST_MEDIA_TYPES.parse().unwrap());

        let mut response = self
            .client
            .head(&url)
            .headers(headers.clone())
            .send()
            .await
            .context(error::ManifestSnafu {
                repo: repo.clone(),
                reference: reference.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(challenge) = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
            {
                let token = self.bearer_token(&repo, challenge).await?;
                response = self
                    .client
                    .head(&url)
                    .headers(headers.clone())
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .send()
                    .await
                    .context(error::ManifestSnafu {
                        repo: repo.clone(),
                        reference: reference.to_string(),
                    })?;
            }
        }

        if !response.status().is_success() {
            return Err(error::UnexpectedStatusSnafu {
                url: url.clone(),
                status: response.status(),
            }
            .build()
            .into());
        }

        if let Some(digest) = response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
        {
            debug!(repo = %repo, reference = %reference, "resolved digest from response header");
            return Ok(strip_algo_prefix(digest));
        }

        // Fall back: GET the manifest body and hash its canonical JSON
        // form, mirroring `twoliter`'s `calculate_digest`.
        let get_response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .context(error::ManifestSnafu {
                repo: repo.clone(),
                reference: reference.to_string(),
            })?;
        let body = get_response
            .bytes()
            .await
            .context(error::ManifestSnafu {
                repo: repo.clone(),
                reference: reference.to_string(),
            })?;

        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|_| {
                anyhow::Error::from(
                    error::MissingDigestSnafu {
                        repo: repo.clone(),
                        reference: reference.to_string(),
                    }
                    .build(),
                )
            })?;

        let mut canonical = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut canonical, olpc_cjson::CanonicalFormatter::new());
        serde::Serialize::serialize(&value, &mut ser).ok().context(error::MissingDigestSnafu {
            repo: repo.clone(),
            reference: reference.to_string(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn strip_algo_prefix(digest: &str) -> String {
    digest
        .split_once(':')
        .map(|(_, d)| d.to_string())
        .unwrap_or_else(|| digest.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_digest_from_content_digest_header() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v2/library/busybox/manifests/latest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Docker-Content-Digest", "sha256:abc123"),
            )
            .mount(&server)
            .await;

        let wrapper = DefaultWrapper::new(None).with_base_url(server.uri());
        let digest = wrapper.digest("busybox", "latest").await.unwrap();
        assert_eq!(digest, "abc123");
    }

    #[tokio::test]
    async fn falls_back_to_canonical_json_hash_without_header() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v2/library/busybox/manifests/latest"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/library/busybox/manifests/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}"))
            .mount(&server)
            .await;

        let wrapper = DefaultWrapper::new(None).with_base_url(server.uri());
        let digest = wrapper.digest("busybox", "latest").await.unwrap();
        assert_eq!(digest.len(), 64);
    }
}
