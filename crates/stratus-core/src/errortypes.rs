use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes shared across the control plane.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: JSON, x.509 key, CIDR, numeric port.
    #[error("parse: {0}")]
    Parse(String),
    /// Unable to reach an external service.
    #[error("connection: {0}")]
    Connection(String),
    /// External service returned an error during an operation.
    #[error("request: {0}")]
    Request(String),
    /// Addressed entity absent; often recovered as a no-op.
    #[error("not found: {0}")]
    NotFound(String),
    /// Database-layer failure; surfaced.
    #[error("database: {0}")]
    Database(String),
    /// Diagnostic only, from the lock supervisor.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// User-visible validation failure, returned alongside a 400 at the
/// handler boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
    pub message: String,
}

impl ErrorData {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}
