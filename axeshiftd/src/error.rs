//! Daemon error types.

use axeshift_domain::DomainError;
use axeshift_exec::ExecError;
use axeshift_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device is held by another in-flight operation
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

impl From<prometheus::Error> for DaemonError {
    fn from(err: prometheus::Error) -> Self {
        DaemonError::Metrics(err.to_string())
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
