//! Error types for dialdoc.
//!
//! Three layers: `HealthError` for ledger updates, `CapabilityError` for
//! every call into the host (adapters, probes, dialer, routes), and
//! `DialdocError` for the few conditions that end a workflow call.

use thiserror::Error;

/// Rejected ledger update. The ledger is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Invalid health record: {0}")]
    InvalidRecord(String),
}

/// Failure reported by an external capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The named object (adapter, interface, route) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The operation did not finish within its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Command `{command}` failed (exit {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The tool or data source backing this capability is missing
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl CapabilityError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CapabilityError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CapabilityError::Timeout(_))
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CapabilityError::Unavailable(err.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                CapabilityError::PermissionDenied(err.to_string())
            }
            _ => CapabilityError::Io(err.to_string()),
        }
    }
}

/// Workflow-level errors. Only `CallerContractViolation` and, when
/// credentials are mandatory, `NoCredentials` escape a workflow call.
#[derive(Error, Debug)]
pub enum DialdocError {
    #[error("No credentials available from parameters, credentials file or saved store")]
    NoCredentials,

    #[error("Caller contract violation: {0}")]
    CallerContractViolation(String),

    #[error("Adapter restore could not be confirmed: {0}")]
    ResourceGuard(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DialdocError {
    pub fn code(&self) -> i32 {
        match self {
            DialdocError::NoCredentials => 10,
            DialdocError::CallerContractViolation(_) => 11,
            DialdocError::ResourceGuard(_) => 12,
            DialdocError::Config(_) => 13,
            DialdocError::Health(_) => 14,
            DialdocError::Capability(_) => 15,
            DialdocError::Io(_) => 16,
            DialdocError::Json(_) => 17,
        }
    }
}
