//! Error types for snapshot generation and verification
//!
//! A file that cannot be opened is not an error here: the pipeline records it
//! as unreadable and keeps going. Everything below aborts the run.

use std::path::PathBuf;
use thiserror::Error;

use crate::digest::DigestAlgorithm;

#[derive(Debug, Error)]
pub enum FreezeError {
    #[error("Failed to walk directory tree at {}: {source}", path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {} while hashing: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path {} is not under the tree root", path.display())]
    OutsideRoot { path: PathBuf },

    #[error("Freeze file not found: {}", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("Freeze file {} is malformed: {reason}", path.display())]
    SnapshotMalformed { path: PathBuf, reason: String },

    #[error("Freeze file {} already exists, use --force to overwrite", .0.display())]
    SnapshotExists(PathBuf),

    #[error("Freeze file was hashed with {stored}, but {configured} is configured")]
    AlgorithmMismatch { stored: DigestAlgorithm, configured: DigestAlgorithm },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hash worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FreezeError>;

impl From<tokio::task::JoinError> for FreezeError {
    fn from(err: tokio::task::JoinError) -> Self {
        FreezeError::Worker(err.to_string())
    }
}
