//! Error types for qkernel.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for qkernel operations.
///
/// A failure raised by code running *inside* the kernel is not an error
/// here; it is carried as data on
/// [`ExecutionResult::failure`](crate::execution::ExecutionResult).
#[derive(Error, Debug)]
pub enum QkernelError {
    /// A session record already exists and its kernel is alive.
    #[error("a kernel is already running (pid {pid}); use 'qkernel stop' first or 'qkernel restart'")]
    AlreadyRunning { pid: u32 },

    /// The kernel subprocess could not be created.
    #[error("failed to spawn kernel: {0}")]
    SpawnFailed(String),

    /// No live session is recorded.
    #[error("no kernel is running; use 'qkernel start' first")]
    NoSessionRunning,

    /// The kernel did not report ready in time.
    #[error("kernel did not become ready within {0:?}")]
    ConnectTimeout(Duration),

    /// No kernelspec with the requested name could be located.
    #[error("kernelspec not found: {0}")]
    KernelSpecNotFound(String),

    /// The kernel did not shut down when asked.
    #[error("graceful shutdown failed: {0}")]
    ShutdownFailed(String),

    /// ZeroMQ socket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A wire message could not be decoded or verified.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The input document could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A cell selector matched no cell.
    #[error("invalid cell selector: {0}")]
    InvalidSelector(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl From<zeromq::ZmqError> for QkernelError {
    fn from(e: zeromq::ZmqError) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Convenience Result type for qkernel operations.
pub type Result<T> = std::result::Result<T, QkernelError>;
