//! Core functionality for freeze
//!
//! This crate records a content snapshot of a directory tree and detects
//! drift against a stored one: files that were modified, removed, added, or
//! can no longer be opened.

pub mod config;
pub mod diff;
pub mod digest;
pub mod enumerate;
pub mod error;
pub mod pipeline;
pub mod snapshot;

pub use config::FreezeConfig;
pub use diff::{DiffReport, DriftKind, check_tree, diff, verify};
pub use digest::DigestAlgorithm;
pub use error::{FreezeError, Result};
pub use pipeline::{HashResult, HashTask, ScanOutcome, generate};
pub use snapshot::Snapshot;
