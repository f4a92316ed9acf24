//! Build-file (Dockerfile) sub-parser.

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::{mpsc, watch};

use crate::common::fs;
use crate::image::{parse_image_line, BuildMetadata, ImageMetadata, ImageRef};
use crate::kind::Flavor;

/// Expands `$VAR` and `${VAR}` references in `token`, resolving each
/// name against `build_args` first, then `global_args`, then the empty
/// string (spec §4.2's stated priority — deliberately not the quirkier
/// behavior of the reference implementation, which spec.md supersedes).
fn expand(token: &str, build_args: &HashMap<String, String>, global_args: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(token.len());
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(end) = chars[i..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + end].iter().collect();
                    out.push_str(&resolve(&name, build_args, global_args));
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
                out.push_str(&resolve(&name, build_args, global_args));
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn resolve(name: &str, build_args: &HashMap<String, String>, global_args: &HashMap<String, String>) -> String {
    build_args
        .get(name)
        .or_else(|| global_args.get(name))
        .cloned()
        .unwrap_or_default()
}

/// Strips any number of matching leading/trailing quote characters from
/// `value` (spec.md §4.2 + supplemented from the original's
/// `stripQuotes`, which tolerates more than one pair).
fn strip_quotes(value: &str) -> String {
    let mut s = value;
    loop {
        let bytes = s.as_bytes();
        if bytes.len() >= 2
            && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
        {
            s = &s[1..s.len() - 1];
        } else {
            break;
        }
    }
    s.to_string()
}

/// Parses Dockerfile-grammar `text` into a stream of Build image
/// references, honoring stage aliases and ARG/FROM variable expansion.
/// Pure/synchronous: no I/O, usable directly by the compose sub-parser
/// on an in-memory build-file body.
pub fn parse_text(
    text: &str,
    path: &str,
    build_args: &HashMap<String, String>,
) -> Result<Vec<ImageRef>, String> {
    let mut position = 0usize;
    let mut global_args: HashMap<String, String> = HashMap::new();
    let mut stages: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut saw_from = false;
    let mut out = Vec::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let instruction = parts.next().unwrap_or("").to_ascii_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        match instruction.as_str() {
            "ARG" => {
                if rest.is_empty() {
                    return Err(format!("{path}:{}: ARG with no argument", lineno + 1));
                }
                let (name, value) = match rest.split_once('=') {
                    Some((n, v)) => (n.trim().to_string(), strip_quotes(v.trim())),
                    None => (rest.to_string(), String::new()),
                };
                if !saw_from {
                    global_args.insert(name, value);
                }
            }
            "FROM" => {
                if rest.is_empty() {
                    return Err(format!("{path}:{}: FROM with no argument", lineno + 1));
                }
                saw_from = true;
                let mut tokens = rest.split_whitespace();
                let image_token = tokens.next().unwrap_or("");
                let expanded = expand(image_token, build_args, &global_args);

                let alias = match (tokens.next(), tokens.next()) {
                    (Some(as_kw), Some(name)) if as_kw.eq_ignore_ascii_case("as") => {
                        Some(name.to_string())
                    }
                    _ => None,
                };

                if stages.contains(&expanded) {
                    if let Some(alias) = alias {
                        stages.insert(alias);
                    }
                    continue;
                }

                let (name, tag, digest) = parse_image_line(&expanded);
                out.push(ImageRef {
                    flavor: Flavor::Build,
                    name,
                    tag,
                    digest,
                    metadata: ImageMetadata::Build(BuildMetadata {
                        path: path.to_string(),
                        position,
                    }),
                    error: None,
                });
                position += 1;

                if let Some(alias) = alias {
                    stages.insert(alias);
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

pub async fn parse_file(
    base: &Path,
    relative_path: &Path,
    build_args: Option<&HashMap<String, String>>,
    cancel: &watch::Receiver<bool>,
    tx: &mpsc::Sender<ImageRef>,
) -> Result<(), String> {
    let full = base.join(relative_path);
    let text = fs::read_to_string(&full)
        .await
        .map_err(|e| e.to_string())?;
    let empty = HashMap::new();
    let args = build_args.unwrap_or(&empty);
    let path = crate::common::to_forward_slash(relative_path);
    let refs = parse_text(&text, &path, args)?;

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

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_s1_build_positions() {
        let text = "FROM ubuntu:bionic\nFROM golang:1.14\nFROM node\n";
        let refs = parse_text(text, "T/Dockerfile", &HashMap::new()).unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].name, "ubuntu");
        assert_eq!(refs[0].tag, "bionic");
        assert_eq!(refs[2].name, "node");
        assert_eq!(refs[2].tag, "latest");
        for (i, r) in refs.iter().enumerate() {
            match &r.metadata {
                ImageMetadata::Build(m) => assert_eq!(m.position, i),
                _ => panic!("expected build metadata"),
            }
        }
    }

    #[test]
    fn scenario_s2_stage_alias_skipped() {
        let text = "FROM busybox AS busy\nFROM busy as another\nFROM ubuntu as worker\n";
        let refs = parse_text(text, "T/Dockerfile", &HashMap::new()).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "busybox");
        assert_eq!(refs[1].name, "ubuntu");
        match &refs[0].metadata {
            ImageMetadata::Build(m) => assert_eq!(m.position, 0),
            _ => panic!(),
        }
        match &refs[1].metadata {
            ImageMetadata::Build(m) => assert_eq!(m.position, 1),
            _ => panic!(),
        }
    }

    #[test]
    fn empty_arg_is_a_parse_error() {
        let text = "ARG\nFROM busybox\n";
        assert!(parse_text(text, "T/Dockerfile", &HashMap::new()).is_err());
    }

    #[test]
    fn empty_from_is_a_parse_error() {
        let text = "FROM\n";
        assert!(parse_text(text, "T/Dockerfile", &HashMap::new()).is_err());
    }

    #[test]
    fn variable_expansion_prefers_build_args_then_global_args() {
        let text = "ARG IMAGE=busybox\nFROM ${IMAGE}\n";
        let mut build_args = HashMap::new();
        build_args.insert("IMAGE".to_string(), "node".to_string());
        let refs = parse_text(text, "T/Dockerfile", &build_args).unwrap();
        assert_eq!(refs[0].name, "node");

        let refs = parse_text(text, "T/Dockerfile", &HashMap::new()).unwrap();
        assert_eq!(refs[0].name, "busybox");
    }

    #[test]
    fn quoted_arg_values_strip_matching_quotes() {
        let text = "ARG IMAGE=\"\"\"busybox\"\"\"\nFROM $IMAGE\n";
        let refs = parse_text(text, "T/Dockerfile", &HashMap::new()).unwrap();
        assert_eq!(refs[0].name, "busybox");
    }
}
