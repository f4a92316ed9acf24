//! Compose-file sub-parser.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};

use super::build;
use super::ParseConfig;
use crate::common::fs;
use crate::image::{parse_image_line, ComposeMetadata, ImageMetadata, ImageRef};
use crate::kind::Flavor;

#[derive(Debug, Deserialize, Default)]
struct ComposeFile {
    #[serde(default)]
    services: HashMap<String, Service>,
}

#[derive(Debug, Deserialize, Default)]
struct Service {
    image: Option<String>,
    build: Option<BuildSection>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BuildSection {
    Context(String),
    Object {
        context: Option<String>,
        dockerfile: Option<String>,
        #[serde(default)]
        args: BuildArgs,
    },
}

#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum BuildArgs {
    #[default]
    Empty,
    List(Vec<String>),
    Map(HashMap<String, Option<String>>),
}

fn load_env_file(path: &Path) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Ok(text) = std::fs::read_to_string(path) else {
        return out;
    };
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            out.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    out
}

/// Builds the environment lookup used for `${VAR}` substitution in the
/// compose document: process environment takes precedence over `.env`
/// entries (spec §4.2/§6).
fn env_lookup(compose_dir: &Path, config: &ParseConfig) -> HashMap<String, String> {
    let env_path = config
        .env_file
        .clone()
        .unwrap_or_else(|| compose_dir.join(".env"));
    let mut merged = load_env_file(&env_path);
    for (k, v) in std::env::vars() {
        merged.insert(k, v);
    }
    merged
}

fn substitute_env(text: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(end) = chars[i..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + end].iter().collect();
                    let name = name.split(':').next().unwrap_or(&name).to_string();
                    out.push_str(env.get(&name).map(String::as_str).unwrap_or(""));
                    i += end + 1;
                    continue;
                }
            } else if chars[i + 1].is_alphanumeric() || chars[i + 1] == '_' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(env.get(&name).map(String::as_str).unwrap_or(""));
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

pub async fn parse_file(
    base: &Path,
    relative_path: &Path,
    config: &ParseConfig,
    cancel: &watch::Receiver<bool>,
    tx: &mpsc::Sender<ImageRef>,
) -> Result<(), String> {
    let full = base.join(relative_path);
    let compose_dir = full.parent().unwrap_or(base).to_path_buf();
    let raw = fs::read_to_string(&full).await.map_err(|e| e.to_string())?;

    let env = env_lookup(&compose_dir, config);
    let substituted = substitute_env(&raw, &env);

    let doc: ComposeFile =
        serde_yaml::from_str(&substituted).map_err(|e| format!("invalid compose YAML: {e}"))?;

    let path_string = crate::common::to_forward_slash(relative_path);
    let mut service_names: Vec<&String> = doc.services.keys().collect();
    service_names.sort();

    for service_name in service_names {
        if *cancel.borrow() {
            return Ok(());
        }
        let service = &doc.services[service_name];

        match &service.build {
            None => {
                let image_line = service.image.clone().unwrap_or_default();
                let (name, tag, digest) = parse_image_line(&image_line);
                let image_ref = ImageRef {
                    flavor: Flavor::Compose,
                    name,
                    tag,
                    digest,
                    metadata: ImageMetadata::Compose(ComposeMetadata {
                        path: path_string.clone(),
                        service_name: service_name.clone(),
                        service_position: 0,
                        build_path: None,
                    }),
                    error: None,
                };
                if tx.send(image_ref).await.is_err() {
                    return Ok(());
                }
            }
            Some(build_section) => {
                let (context, dockerfile, args) = match build_section {
                    BuildSection::Context(ctx) => (ctx.clone(), None, HashMap::new()),
                    BuildSection::Object {
                        context,
                        dockerfile,
                        args,
                    } => (
                        context.clone().unwrap_or_else(|| ".".to_string()),
                        dockerfile.clone(),
                        match args {
                            BuildArgs::Empty => HashMap::new(),
                            BuildArgs::List(list) => list
                                .iter()
                                .filter_map(|entry| entry.split_once('='))
                                .map(|(k, v)| (k.to_string(), Some(v.to_string())))
                                .collect(),
                            BuildArgs::Map(map) => map.clone(),
                        },
                    ),
                };

                let context_path = if Path::new(&context).is_absolute() {
                    Path::new(&context).to_path_buf()
                } else {
                    compose_dir.join(&context)
                };
                let dockerfile_name = dockerfile.unwrap_or_else(|| "Dockerfile".to_string());
                let build_file_full = context_path.join(&dockerfile_name);
                let build_file_relative = build_file_full
                    .strip_prefix(base)
                    .unwrap_or(&build_file_full)
                    .to_path_buf();
                let build_path_string = crate::common::to_forward_slash(&build_file_relative);

                let resolved_args: HashMap<String, String> = args
                    .into_iter()
                    .map(|(k, v)| {
                        let value = v.or_else(|| env.get(&k).cloned()).unwrap_or_default();
                        (k, value)
                    })
                    .collect();

                let text = fs::read_to_string(&build_file_full)
                    .await
                    .map_err(|e| e.to_string())?;
                let build_refs = build::parse_text(&text, &build_path_string, &resolved_args)?;

                for build_ref in build_refs {
                    let position = match &build_ref.metadata {
                        ImageMetadata::Build(m) => m.position,
                        _ => 0,
                    };
                    let image_ref = ImageRef {
                        flavor: Flavor::Compose,
                        name: build_ref.name,
                        tag: build_ref.tag,
                        digest: build_ref.digest,
                        metadata: ImageMetadata::Compose(ComposeMetadata {
                            path: path_string.clone(),
                            service_name: service_name.clone(),
                            service_position: position,
                            build_path: Some(build_path_string.clone()),
                        }),
                        error: None,
                    };
                    if tx.send(image_ref).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn scenario_s3_compose_with_build() {
        let dir = tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("sub/Dockerfile"), "FROM busybox")
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join("docker-compose.yml"),
            "services:\n  svc:\n    build: ./sub\n",
        )
        .await
        .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        parse_file(
            dir.path(),
            Path::new("docker-compose.yml"),
            &ParseConfig::default(),
            &cancel_rx,
            &tx,
        )
        .await
        .unwrap();
        drop(tx);

        let mut out = Vec::new();
        while let Some(r) = rx.recv().await {
            out.push(r);
        }

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "busybox");
        assert_eq!(out[0].tag, "latest");
        match &out[0].metadata {
            ImageMetadata::Compose(m) => {
                assert_eq!(m.service_name, "svc");
                assert_eq!(m.build_path.as_deref(), Some("sub/Dockerfile"));
                assert_eq!(m.path, "docker-compose.yml");
            }
            _ => panic!("expected compose metadata"),
        }
    }

    #[tokio::test]
    async fn image_only_service_has_no_build_path() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("docker-compose.yml"),
            "services:\n  svc:\n    image: redis:6\n",
        )
        .await
        .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        parse_file(
            dir.path(),
            Path::new("docker-compose.yml"),
            &ParseConfig::default(),
            &cancel_rx,
            &tx,
        )
        .await
        .unwrap();
        drop(tx);

        let mut out = Vec::new();
        while let Some(r) = rx.recv().await {
            out.push(r);
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "redis");
        assert_eq!(out[0].tag, "6");
    }
}
