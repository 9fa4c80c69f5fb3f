use std::path::PathBuf;

use thiserror::Error;

/// Main error type for benchmark setup and runs
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("manifest file not found in {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("metrics log write failed: {0}")]
    MetricsLog(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BenchError {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Config(_) | BenchError::TomlParse(_) => 2,
            BenchError::ManifestNotFound(_) => 3,
            BenchError::Backend(_) => 4,
            BenchError::MetricsLog(_) | BenchError::Io(_) => 5,
            _ => 1,
        }
    }

    /// Stable code for JSON error output
    pub fn error_code(&self) -> &'static str {
        match self {
            BenchError::Io(_) => "io_error",
            BenchError::Json(_) => "json_error",
            BenchError::TomlParse(_) | BenchError::TomlSerialize(_) | BenchError::Config(_) => {
                "invalid_config"
            }
            BenchError::ManifestNotFound(_) => "manifest_not_found",
            BenchError::MetricsLog(_) => "metrics_log",
            BenchError::Backend(_) => "backend_error",
            BenchError::Join(_) => "internal",
        }
    }

    /// Actionable hints printed after the error message
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            BenchError::ManifestNotFound(_) => vec![
                "Run 'brokerbench generate --output-dir <dir>' to create test data",
                "Or pass --data-dir pointing at a directory with manifest.json",
            ],
            BenchError::Backend(_) => vec![
                "Check that both brokers are running and reachable",
                "Verify [kafka] and [rabbitmq] settings with 'brokerbench show-config'",
            ],
            BenchError::MetricsLog(_) => vec![
                "Check disk space and write permissions for the metrics log path",
            ],
            _ => vec![],
        }
    }
}

/// Recoverable failure of a single send, converted into a failed outcome at
/// the adapter boundary
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rejected by broker: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, BenchError>;
