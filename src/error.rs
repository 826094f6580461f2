use thiserror::Error;

use crate::pss::PolicyNotSatisfiedError;

pub type Result<T> = std::result::Result<T, KubesecError>;

#[derive(Error, Debug)]
pub enum KubesecError {
    #[error("invalid input {0}")]
    InvalidInput(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid policy version: {0}")]
    InvalidPolicyVersion(String),

    #[error(transparent)]
    PolicyNotSatisfied(#[from] PolicyNotSatisfiedError),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl KubesecError {
    /// Exit code for "the tool failed to run". Scans that ran and found
    /// problems use the configurable scan exit code instead.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
