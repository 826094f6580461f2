use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::SchemaConfig;

pub const CONFIG_FILE: &str = ".kubesec.toml";

/// Top-level configuration from `.kubesec.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub pss: PssConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Exit code used when a scan ran but the manifest failed.
    pub exit_code: i32,
    /// Report absolute file paths.
    pub absolute_path: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exit_code: 2,
            absolute_path: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PssConfig {
    pub profile: String,
    pub version: String,
}

impl Default for PssConfig {
    fn default() -> Self {
        Self {
            profile: "restricted".into(),
            version: "latest".into(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# kubesec configuration

[schema]
# Skip Kubernetes schema validation entirely.
disable_validation = false

# Schema locations (local paths or URLs), checked in order.
# Empty means the upstream kubernetes-json-schema repository.
# locations = ["./schemas", "default"]

kubernetes_version = "latest"
strict = true

[scan]
# Exit code when a resource scores zero or below, or fails validation.
exit_code = 2
absolute_path = false

[pss]
# Pod Security Standards profile (privileged, baseline, restricted).
profile = "restricted"
version = "latest"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/.kubesec.toml")).unwrap();
        assert_eq!(config.scan.exit_code, 2);
        assert_eq!(config.pss.profile, "restricted");
        assert_eq!(config.schema.kubernetes_version, "latest");
        assert!(!config.schema.disable_validation);
    }

    #[test]
    fn starter_config_parses_to_defaults() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config.scan.exit_code, ScanConfig::default().exit_code);
        assert_eq!(config.pss.version, "latest");
        assert!(config.schema.strict);
        assert!(config.schema.locations.is_empty());
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[schema]\ndisable_validation = true\nlocations = [\"./schemas\"]\n\n[pss]\nprofile = \"baseline\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.schema.disable_validation);
        assert_eq!(config.schema.locations, vec!["./schemas".to_string()]);
        assert_eq!(config.pss.profile, "baseline");
        assert_eq!(config.pss.version, "latest");
        assert_eq!(config.scan.exit_code, 2);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan\nexit_code = 2").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
