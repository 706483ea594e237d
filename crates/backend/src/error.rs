//! Backend error taxonomy.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network failure, throttling or a server-side fault. Safe to retry.
    #[error("{op}: transient backend error: {message}")]
    Transient { op: &'static str, message: String },

    #[error("{op}: no response within {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The backend refused the request (bad expression, quota, missing
    /// resource). Retrying will not help.
    #[error("{op}: rejected ({code}): {message}")]
    Rejected {
        op: &'static str,
        code: String,
        message: String,
    },

    /// The resource being created is already there.
    #[error("{op}: already exists: {message}")]
    AlreadyExists { op: &'static str, message: String },

    /// The adapter itself could not be built.
    #[error("backend configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transient { .. } | BackendError::Timeout { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, BackendError::AlreadyExists { .. })
    }

    pub fn rejected(op: &'static str, code: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            op,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transient(op: &'static str, message: impl Into<String>) -> Self {
        BackendError::Transient {
            op,
            message: message.into(),
        }
    }
}
