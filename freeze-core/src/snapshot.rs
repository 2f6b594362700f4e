//! Snapshots and the freeze file
//!
//! A snapshot maps root-relative paths to content digests. On disk it is a
//! pretty-printed JSON document with sorted keys:
//!
//! ```json
//! {
//!     "version": 1,
//!     "algorithm": "sha1",
//!     "files": {
//!         "bin/app": "…"
//!     }
//! }
//! ```
//!
//! A bare `{ "<path>": "<digest>" }` object is also accepted and read as sha1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::digest::DigestAlgorithm;
use crate::error::{FreezeError, Result};

/// Current freeze file layout version
pub const FORMAT_VERSION: u32 = 1;

/// Path to digest mapping for one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    algorithm: DigestAlgorithm,
    files: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm, files: BTreeMap::new() }
    }

    pub fn from_entries<K, V>(
        algorithm: DigestAlgorithm,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let files = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { algorithm, files }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Record a digest, returning the previous one for `path` if any
    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) -> Option<String> {
        self.files.insert(path.into(), digest.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Read a freeze file
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FreezeError::SnapshotMissing(path.to_path_buf()));
            }
            Err(e) => return Err(FreezeError::Io(e)),
        };

        let snapshot = Self::parse(&content).map_err(|reason| FreezeError::SnapshotMalformed {
            path: path.to_path_buf(),
            reason,
        })?;

        debug!("Loaded {} entries ({}) from {:?}", snapshot.len(), snapshot.algorithm, path);
        Ok(snapshot)
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

        // Versioned files carry a numeric top-level "version". In a legacy flat map
        // "version" can only be a file path with a string digest.
        let versioned = value.get("version").is_some_and(|version| !version.is_string());
        let snapshot = if versioned {
            let file: FreezeFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
            if file.version != FORMAT_VERSION {
                return Err(format!("unsupported format version {}", file.version));
            }
            Snapshot { algorithm: file.algorithm, files: file.files }
        } else {
            let files: BTreeMap<String, String> =
                serde_json::from_str(content).map_err(|e| format!("legacy freeze file: {}", e))?;
            Snapshot { algorithm: DigestAlgorithm::Sha1, files }
        };

        if let Some((path, digest)) =
            snapshot.iter().find(|(_, digest)| !snapshot.algorithm.is_valid_digest(digest))
        {
            return Err(format!(
                "entry {:?} has digest {:?}, which is not a {} digest",
                path, digest, snapshot.algorithm
            ));
        }

        Ok(snapshot)
    }

    /// Serialize with 4-space indentation and a trailing newline
    pub fn to_json(&self) -> Result<String> {
        let file = FreezeFile {
            version: FORMAT_VERSION,
            algorithm: self.algorithm,
            files: self.files.clone(),
        };

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        file.serialize(&mut serializer).map_err(std::io::Error::from)?;
        buffer.push(b'\n');

        String::from_utf8(buffer).map_err(|e| FreezeError::Io(std::io::Error::other(e)))
    }

    /// Write the freeze file atomically.
    ///
    /// Unless `overwrite` is set an existing file is left untouched and
    /// [`FreezeError::SnapshotExists`] is returned.
    pub fn save(&self, path: &Path, overwrite: bool) -> Result<()> {
        if !overwrite {
            ensure_absent(path)?;
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let json = self.to_json()?;

        let mut temp = tempfile::Builder::new().prefix(".freeze-").suffix(".tmp").tempfile_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        if overwrite {
            temp.persist(path).map_err(|e| FreezeError::Io(e.error))?;
        } else {
            temp.persist_noclobber(path).map_err(|e| match e.error.kind() {
                ErrorKind::AlreadyExists => FreezeError::SnapshotExists(path.to_path_buf()),
                _ => FreezeError::Io(e.error),
            })?;
        }

        info!("Wrote {} entries to {:?}", self.len(), path);
        Ok(())
    }
}

/// Fail with [`FreezeError::SnapshotExists`] if `path` is present.
///
/// Anything other than a clean "not found" counts as present.
pub fn ensure_absent(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        _ => Err(FreezeError::SnapshotExists(path.to_path_buf())),
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FreezeFile {
    version: u32,
    algorithm: DigestAlgorithm,
    files: BTreeMap<String, String>,
}
