//! Kubernetes JSON schema validation.
//!
//! Schemas are looked up the way kubeconform does it: every configured
//! location is a path or URL template, expanded for the document's kind and
//! apiVersion and tried in order until one resolves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jsonschema::{Draft, Validator};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KubesecError, Result};
use crate::manifest::Node;

/// Upstream mirror of the Kubernetes OpenAPI schemas in JSON schema form.
pub const DEFAULT_SCHEMA_LOCATION: &str =
    "https://raw.githubusercontent.com/yannh/kubernetes-json-schema/master/";

const DEFAULT_PATH_TEMPLATE: &str =
    "{{ .NormalizedKubernetesVersion }}-standalone{{ .StrictSuffix }}/{{ .ResourceKind }}{{ .KindSuffix }}.json";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*\.([A-Za-z]+)\s*\}\}").unwrap());

static HTTP_CLIENT: OnceCell<Client> = OnceCell::new();

/// Schema validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Skip validation entirely. Useful when manifests come straight from a
    /// cluster and are known to be well formed.
    pub disable_validation: bool,
    /// Local paths or URLs, optionally templated, checked in order.
    pub locations: Vec<String>,
    /// `latest` or a release such as `1.29.0` / `v1.29.0`.
    pub kubernetes_version: String,
    /// Reject properties the schema does not declare.
    pub strict: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            disable_validation: false,
            locations: Vec::new(),
            kubernetes_version: "latest".into(),
            strict: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    /// The document does not conform to its schema.
    Invalid,
    /// Validation could not be carried out, e.g. no schema was found.
    Error,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub message: String,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            status: ValidationStatus::Valid,
            message: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Invalid,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Error,
            message: message.into(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: ValidationStatus::Skipped,
            message: String::new(),
        }
    }
}

/// Checks a decoded document against its Kubernetes schema.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, file_name: &str, document: &Value) -> Vec<ValidationResult>;
}

/// `latest` (or nothing) maps to the `master` schema tree; anything else is
/// a release tag and gets a `v` prefix.
pub fn normalize_version(version: &str) -> String {
    match version.trim() {
        "" | "latest" | "master" => "master".into(),
        v if v.starts_with('v') => v.to_string(),
        v => format!("v{v}"),
    }
}

/// Expand one schema location for a resource.
pub fn expand_location(
    location: &str,
    kind: &str,
    api_version: &str,
    kubernetes_version: &str,
    strict: bool,
) -> String {
    let mut template = if location.is_empty() || location == "default" {
        format!("{DEFAULT_SCHEMA_LOCATION}{DEFAULT_PATH_TEMPLATE}")
    } else {
        location.to_string()
    };
    if !template.contains("{{") && !template.ends_with("json") {
        if !template.ends_with('/') {
            template.push('/');
        }
        template.push_str(DEFAULT_PATH_TEMPLATE);
    }

    let mut group_parts = api_version.split('/');
    let first = group_parts.next().unwrap_or_default();
    let version = group_parts.next();
    let group = first.split('.').next().unwrap_or_default().to_lowercase();
    let (resource_api_version, kind_suffix) = match version {
        Some(v) => (v.to_string(), format!("-{group}-{}", v.to_lowercase())),
        None => (first.to_string(), format!("-{group}")),
    };
    let normalized = normalize_version(kubernetes_version);
    let strict_suffix = if strict { "-strict" } else { "" };
    let resource_kind = kind.to_lowercase();

    PLACEHOLDER
        .replace_all(&template, |caps: &regex::Captures<'_>| match &caps[1] {
            "NormalizedKubernetesVersion" => normalized.clone(),
            "StrictSuffix" => strict_suffix.to_string(),
            "ResourceKind" => resource_kind.clone(),
            "ResourceAPIVersion" => resource_api_version.clone(),
            "Group" => group.clone(),
            "KindSuffix" => kind_suffix.clone(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn http_client() -> Result<&'static Client> {
    HTTP_CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| KubesecError::Schema(format!("failed initializing validator: {e}")))
    })
}

/// Fetch a raw schema. `Ok(None)` means "not at this location".
fn fetch_schema(location: &str) -> std::result::Result<Option<Value>, String> {
    if is_remote(location) {
        let client = http_client().map_err(|e| e.to_string())?;
        let response = client
            .get(location)
            .send()
            .map_err(|e| format!("failed downloading schema at {location}: {e}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!(
                "failed downloading schema at {location}: http status {}",
                response.status()
            ));
        }
        return response
            .json::<Value>()
            .map(Some)
            .map_err(|e| format!("failed parsing schema at {location}: {e}"));
    }

    let path = location.strip_prefix("file://").unwrap_or(location);
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| format!("failed parsing schema at {location}: {e}")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("failed reading schema at {location}: {e}")),
    }
}

fn compile(mut schema: Value, location: &str) -> std::result::Result<Validator, String> {
    // The mirrored schemas declare a draft URI the compiler does not
    // recognise; they are draft 4 documents.
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
    }
    jsonschema::options()
        .with_draft(Draft::Draft4)
        .build(&schema)
        .map_err(|e| format!("failed compiling schema at {location}: {e}"))
}

/// Validator backed by kubeconform-style schema locations.
pub struct KubeSchemaValidator {
    locations: Vec<String>,
    kubernetes_version: String,
    strict: bool,
    /// Resolved validators per `(kind, apiVersion)`; `None` marks a schema
    /// that was found nowhere.
    cache: Mutex<HashMap<(String, String), Option<Arc<Validator>>>>,
}

impl KubeSchemaValidator {
    pub fn new(config: &SchemaConfig) -> Self {
        let locations = if config.locations.is_empty() {
            vec!["default".to_string()]
        } else {
            config.locations.clone()
        };
        Self {
            locations,
            kubernetes_version: config.kubernetes_version.clone(),
            strict: config.strict,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self, kind: &str, api_version: &str) -> std::result::Result<Option<Arc<Validator>>, String> {
        let key = (kind.to_string(), api_version.to_string());
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let mut resolved = None;
        for location in &self.locations {
            let expanded = expand_location(location, kind, api_version, &self.kubernetes_version, self.strict);
            tracing::debug!(location = %expanded, "looking up schema");
            if let Some(schema) = fetch_schema(&expanded)? {
                resolved = Some(Arc::new(compile(schema, &expanded)?));
                break;
            }
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, resolved.clone());
        }
        Ok(resolved)
    }
}

impl SchemaValidator for KubeSchemaValidator {
    fn validate(&self, file_name: &str, document: &Value) -> Vec<ValidationResult> {
        let root = Node::new(document);
        let Some(kind) = root.at("kind").as_str().filter(|k| !k.is_empty()) else {
            return vec![ValidationResult::invalid(format!("{file_name}: missing kind"))];
        };
        let Some(api_version) = root.at("apiVersion").as_str().filter(|v| !v.is_empty()) else {
            return vec![ValidationResult::invalid(format!("{file_name}: missing apiVersion"))];
        };

        let validator = match self.resolve(kind, api_version) {
            Ok(Some(validator)) => validator,
            Ok(None) => {
                return vec![ValidationResult::error(format!(
                    "unknown schema for {kind} ({api_version})"
                ))]
            }
            Err(message) => return vec![ValidationResult::error(message)],
        };

        let errors: Vec<String> = validator.iter_errors(document).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            vec![ValidationResult::valid()]
        } else {
            vec![ValidationResult::invalid(format!(
                "{file_name} - {kind} is invalid: {}",
                errors.join("; ")
            ))]
        }
    }
}
