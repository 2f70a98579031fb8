//! Coordination errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("Node not found: {0}")]
    NotFound(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Session is closed")]
    Closed,
    #[error("Timed out acquiring lock {0}")]
    LockTimeout(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Corrupt node {path}: {reason}")]
    Corrupt { path: String, reason: String },
}
