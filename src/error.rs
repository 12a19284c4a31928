use std::path::PathBuf;

use thiserror::Error;

/// Rejected analysis parameters. Raised before any sample is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("parameter '{field}' must be numeric, got '{value}'")]
    NotNumeric { field: String, value: String },
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("malformed override '{0}', expected key=value")]
    MalformedOverride(String),
}

#[derive(Error, Debug)]
pub enum CmjError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("recording contains no valid samples")]
    EmptyRecording,
    #[error("override index {index} is outside the recording (len {len})")]
    OverrideOutOfRange { index: usize, len: usize },
}

impl CmjError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CmjError::Io {
            path: path.into(),
            source,
        }
    }
}
