//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur during device operations.
///
/// None of these are fatal to the fleet: callers log them, count them
/// against the device and move on.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Connection-level failure talking to the device
    #[error("Device transport error: {0}")]
    Transport(String),

    /// Device did not answer within the request timeout
    #[error("Device request timed out")]
    Timeout,

    /// Device answered with a non-success status
    #[error("Device rejected request: HTTP {status}")]
    Rejected { status: u16, body: String },

    /// Device answered with something we could not use
    #[error("Invalid device response: {0}")]
    InvalidResponse(String),

    /// Every apply attempt failed
    #[error("Settings not applied after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A smooth transition stopped part-way
    #[error("Transition aborted at step {step}/{steps}: {reason}")]
    TransitionAborted { step: u32, steps: u32, reason: String },
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
