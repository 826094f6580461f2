pub mod console;
pub mod json;
pub mod sarif;
pub mod yaml;

use serde::{Deserialize, Serialize};

use crate::error::{KubesecError, Result};
use crate::pss;
use crate::rules::{Report, Rule};

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
    Sarif,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "table" | "console" | "text" => Some(Self::Table),
            "sarif" => Some(Self::Sarif),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Table => "table",
            Self::Sarif => "sarif",
        }
    }
}

/// Render scan reports into the specified format.
pub fn render(reports: &[Report], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::render(reports),
        OutputFormat::Yaml => yaml::render(reports),
        OutputFormat::Table => Ok(console::render(reports)),
        OutputFormat::Sarif => sarif::render(reports),
    }
}

/// Render Pod Security Standards reports. Only the structured formats apply.
pub fn render_pss(reports: &[pss::Report], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::render(reports),
        OutputFormat::Yaml => yaml::render(reports),
        other => Err(KubesecError::Output(format!(
            "format {} is not supported for Pod Security Standards reports",
            other.as_str()
        ))),
    }
}

/// Render the rule catalogue.
pub fn render_rules(rules: &[&Rule], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::render(rules),
        OutputFormat::Yaml => yaml::render(rules),
        OutputFormat::Table => Ok(console::render_rules(rules)),
        OutputFormat::Sarif => Err(KubesecError::Output(
            "format sarif is not supported for the rule list".into(),
        )),
    }
}
