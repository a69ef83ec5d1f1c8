//! Error types for the `fanrun` engine.
//!
//! Only conditions that corrupt or prevent a whole batch surface here.
//! Per-command failures (spawn errors, forced kills, aborted commands) are
//! recorded in that command's [`CommandResult`](crate::CommandResult).

use std::os::fd::RawFd;

use thiserror::Error;

/// Result type alias using the engine [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `fanrun` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The readiness wait reported a descriptor the engine does not track.
    /// This is an internal bookkeeping defect and aborts the batch.
    #[error("Readiness reported for untracked handle (fd {fd})")]
    UnknownHandle { fd: RawFd },

    /// `poll(2)` failed for a reason other than interruption.
    #[error("Readiness wait failed: {0}")]
    Poll(#[from] nix::errno::Errno),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed line in a command batch
    #[error("Invalid command on line {line}: {reason}")]
    Batch { line: usize, reason: String },

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
