//! Manifest input handling: splitting multi-document files, decoding
//! YAML/JSON into structured values, and naming objects.

pub mod query;

use serde_json::Value;

use crate::error::{KubesecError, Result};

pub use query::Node;

/// Name used for manifests read from standard input.
pub const STDIN_NAME: &str = "STDIN";

const DOCUMENT_SEPARATOR: &str = "---";

/// A manifest's raw content plus the name it was read from.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a manifest from a path, or from stdin when the path is `-` or
    /// `/dev/stdin`. Empty and non-UTF-8 content are rejected.
    pub fn read(path: &std::path::Path, absolute_path: bool) -> Result<Self> {
        use std::io::Read;

        let manifest = if path.as_os_str() == "-" || path == std::path::Path::new("/dev/stdin") {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Self::new(STDIN_NAME, bytes)
        } else {
            let absolute = std::path::absolute(path)?;
            let bytes = std::fs::read(&absolute)?;
            let name = if absolute_path {
                absolute.display().to_string()
            } else {
                path.display().to_string()
            };
            Self::new(name, bytes)
        };

        if manifest.bytes.is_empty() {
            return Err(KubesecError::InvalidInput(format!(
                "{}: provided file is empty",
                manifest.name
            )));
        }
        if std::str::from_utf8(&manifest.bytes).is_err() {
            return Err(KubesecError::InvalidInput(format!(
                "{}: content is not UTF-8 text",
                manifest.name
            )));
        }
        Ok(manifest)
    }

    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|e| KubesecError::InvalidInput(format!("{}: {}", self.name, e)))
    }
}

/// Windows line endings are only honoured on Windows hosts.
fn detect_line_break(text: &str) -> &'static str {
    if cfg!(windows) && text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Split raw text on lines consisting solely of `---`. Chunks are trimmed
/// and empty ones dropped.
pub fn split_documents(text: &str) -> Vec<&str> {
    let line_break = detect_line_break(text);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in text.split(line_break) {
        let line_end = offset + line.len();
        if line == DOCUMENT_SEPARATOR {
            chunks.push(&text[start..offset]);
            start = (line_end + line_break.len()).min(text.len());
        }
        offset = (line_end + line_break.len()).min(text.len());
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }

    chunks
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

fn is_comment_only(chunk: &str) -> bool {
    chunk
        .lines()
        .map(str::trim)
        .all(|l| l.is_empty() || l.starts_with('#'))
}

/// Decode a manifest into one structured document per input document.
///
/// Valid JSON is always a single document. Anything else is treated as a
/// YAML stream. Unparseable YAML, or input with no documents at all, is an
/// [`KubesecError::InvalidInput`].
pub fn parse_documents(source: &str, text: &str) -> Result<Vec<Value>> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(vec![value]);
    }

    let mut documents = Vec::new();
    for chunk in split_documents(text).into_iter().filter(|c| !is_comment_only(c)) {
        let value: Value = serde_yaml::from_str(chunk)
            .map_err(|e| KubesecError::InvalidInput(format!("{source}: {e}")))?;
        // a bare `~` or `null` document carries nothing to scan
        if !value.is_null() {
            documents.push(value);
        }
    }

    if documents.is_empty() {
        return Err(KubesecError::InvalidInput(source.to_string()));
    }
    Ok(documents)
}

/// Lenient object extraction used by the Pod Security Standards scan.
///
/// A top-level JSON array is expanded into its elements. Documents that
/// fail to parse are skipped rather than failing the whole manifest.
pub fn collect_objects(text: &str) -> Vec<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(items) => items,
            Err(e) => {
                tracing::debug!(error = %e, "manifest looks like a JSON array but does not parse");
                Vec::new()
            }
        };
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return vec![value];
    }

    split_documents(text)
        .into_iter()
        .filter(|c| !is_comment_only(c))
        .filter_map(|chunk| match serde_yaml::from_str::<Value>(chunk) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "unable to decode resource");
                None
            }
        })
        .collect()
}

/// Standard object naming: `<Kind>/<name>.<namespace>`.
pub fn object_name(kind: &str, name: Option<&str>, namespace: Option<&str>) -> String {
    let name = name.filter(|n| !n.is_empty()).unwrap_or("undefined");
    let namespace = namespace.filter(|n| !n.is_empty()).unwrap_or("default");
    format!("{kind}/{name}.{namespace}")
}

/// [`object_name`] for an untyped document.
pub fn document_name(document: &Value) -> String {
    let root = Node::new(document);
    object_name(
        root.at("kind").as_str().unwrap_or_default(),
        root.at("metadata.name").as_str(),
        root.at("metadata.namespace").as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_on_separator_lines_only() {
        let text = "a: 1\n---\nb: 2\n--- # not a separator\nc: 3\n";
        let docs = split_documents(text);
        assert_eq!(docs, vec!["a: 1", "b: 2\n--- # not a separator\nc: 3"]);
    }

    #[test]
    fn leading_and_trailing_separators_are_skipped() {
        let text = "---\n\napiVersion: v1\nkind: Pod\n\n---\n\n---\n";
        assert_eq!(split_documents(text), vec!["apiVersion: v1\nkind: Pod"]);
    }

    #[test]
    fn two_documents_keep_input_order() {
        let text = "\nkind: Pod\nmetadata:\n  name: first\n\n---\n\nkind: Pod\nmetadata:\n  name: second\n";
        let docs = parse_documents("test.yaml", text).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["metadata"]["name"], "first");
        assert_eq!(docs[1]["metadata"]["name"], "second");
    }

    #[test]
    fn json_is_one_document() {
        let docs = parse_documents("x.json", r#"{"kind":"Pod","spec":{}}"#).unwrap();
        assert_eq!(docs, vec![json!({"kind": "Pod", "spec": {}})]);
    }

    #[test]
    fn separator_only_input_is_invalid() {
        let err = parse_documents("STDIN", "---\n---\n").unwrap_err();
        assert!(matches!(err, KubesecError::InvalidInput(_)));
        assert_eq!(err.to_string(), "invalid input STDIN");
    }

    #[test]
    fn malformed_yaml_is_invalid_input() {
        let err = parse_documents("bad.yaml", "kind: Pod\nspec: [unclosed\n").unwrap_err();
        assert!(matches!(err, KubesecError::InvalidInput(ref m) if m.starts_with("bad.yaml")));
    }

    #[test]
    fn comment_only_documents_are_dropped() {
        let docs = parse_documents("c.yaml", "# header\n---\nkind: Pod\n").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn json_array_is_expanded_for_object_collection() {
        let objects = collect_objects(r#" [{"kind":"Pod"},{"kind":"Job"}]"#);
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn unparseable_chunks_are_skipped_for_object_collection() {
        let objects = collect_objects("kind: Pod\n---\nspec: [oops\n---\nkind: Job\n");
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn object_names_fall_back_to_defaults() {
        assert_eq!(object_name("Pod", None, Some("")), "Pod/undefined.default");
        let doc = json!({"kind": "Deployment", "metadata": {"name": "web", "namespace": "prod"}});
        assert_eq!(document_name(&doc), "Deployment/web.prod");
    }
}
