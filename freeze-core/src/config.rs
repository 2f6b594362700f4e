//! Run configuration
//!
//! Values come from defaults, then an optional TOML file, then CLI overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::digest::DigestAlgorithm;
use crate::error::{FreezeError, Result};

/// Number of hash workers. Independent of CPU count and tree size.
pub const DEFAULT_WORKERS: usize = 64;

/// Name of the stored snapshot inside the tree root
pub const DEFAULT_SNAPSHOT_FILE: &str = ".freeze";

/// Config file picked up from the tree root when no path is given
pub const CONFIG_FILE_NAME: &str = ".freeze.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreezeConfig {
    /// Number of concurrent hash workers
    pub workers: usize,

    /// Capacity of the path and result queues, defaults to `workers`
    pub queue_capacity: Option<usize>,

    /// Snapshot file, relative to the tree root
    pub snapshot_file: PathBuf,

    /// Digest algorithm for new snapshots. `None` means the default for
    /// `init` and whatever the stored snapshot declares for `check`.
    pub algorithm: Option<DigestAlgorithm>,
}

impl Default for FreezeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: None,
            snapshot_file: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            algorithm: None,
        }
    }
}

impl FreezeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FreezeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: FreezeConfig = toml::from_str(&content).map_err(|e| {
            FreezeError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Use `explicit` if given, else `.freeze.toml` under `root` if present,
    /// else defaults.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!("Loading configuration from {:?}", path);
            return Self::load(path);
        }

        let candidate = root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!("Loading configuration from {:?}", candidate);
            Self::load(&candidate)
        } else {
            debug!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FreezeError::Config("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == Some(0) {
            return Err(FreezeError::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.snapshot_file.as_os_str().is_empty() {
            return Err(FreezeError::Config("snapshot_file must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers)
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm.unwrap_or_default()
    }

    /// Snapshot location for a tree rooted at `root`
    pub fn snapshot_path(&self, root: &Path) -> PathBuf {
        root.join(&self.snapshot_file)
    }
}
