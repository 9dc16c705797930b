use thiserror::Error;

use crate::model::ValidationError;

/// The closed set of failure kinds a session artifact operation can surface.
#[derive(Error, Debug)]
pub enum OrchError {
    #[error("validation failed: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ValidationError>),

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt JSON at {path}")]
    Corrupt { path: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("check failed: {check}: {message}")]
    CheckFailed { check: String, message: String },

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

pub type Result<T> = std::result::Result<T, OrchError>;

impl OrchError {
    pub fn corrupt(path: impl Into<String>) -> Self {
        OrchError::Corrupt { path: path.into() }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        OrchError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn validation(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        OrchError::Validation(vec![ValidationError::new(field_path, message)])
    }
}
