//! Executor error types
//!
//! Delivery failures never surface here: they are absorbed by the worker and
//! retried. These errors cover construction, lifecycle misuse and handler
//! resource release.

use thiserror::Error;

/// Executor errors
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Configuration rejected at construction time
    #[error("invalid executor config: {field} {message}")]
    InvalidConfig {
        /// Offending field name
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("executor '{name}' cannot {operation} while {state}")]
    InvalidState {
        /// Executor name
        name: String,
        /// Operation attempted
        operation: &'static str,
        /// Current lifecycle state
        state: &'static str,
    },

    /// `start()` was called outside a tokio runtime
    #[error("executor '{0}' must be started from within a tokio runtime")]
    NoRuntime(String),
}

impl ExecutorError {
    /// Create an InvalidConfig error
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

/// Errors a handler may report from `finalize`
///
/// The executor logs these and still completes shutdown.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// I/O error while releasing the handler's resources
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for executor operations
pub type Result<T> = std::result::Result<T, ExecutorError>;
