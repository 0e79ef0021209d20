//! Error types for burst-zip

use std::io;

/// Result type for burst-zip operations
pub type Result<T> = std::result::Result<T, BurstError>;

/// Error types that can occur while producing or inspecting an archive
#[derive(Debug)]
pub enum BurstError {
    /// I/O error from the output sink or an entry reader
    Io(io::Error),
    /// Zstandard codec failure
    Codec(String),
    /// Caller handed in something the writer cannot accept
    InvalidArgument(String),
    /// Invalid archive structure encountered while parsing
    InvalidFormat(String),
    /// An internal alignment invariant was breached; this is a bug in the
    /// planner, and debug builds abort instead of returning it
    AlignmentViolation(String),
}

impl std::fmt::Display for BurstError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BurstError::Io(e) => write!(f, "I/O error: {}", e),
            BurstError::Codec(msg) => write!(f, "Codec error: {}", msg),
            BurstError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            BurstError::InvalidFormat(msg) => write!(f, "Invalid archive format: {}", msg),
            BurstError::AlignmentViolation(msg) => write!(f, "Alignment violation: {}", msg),
        }
    }
}

impl std::error::Error for BurstError {}

impl From<io::Error> for BurstError {
    fn from(err: io::Error) -> Self {
        BurstError::Io(err)
    }
}
