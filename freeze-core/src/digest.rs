//! Content digests
//!
//! The algorithm is pinned per snapshot. Changing it makes every stored digest
//! incomparable, so the freeze file records which one produced it.

use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncReadExt;

use crate::error::{FreezeError, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithm used for file contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// 160-bit SHA-1, the historical default
    #[default]
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    /// Length of a hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
        }
    }

    /// Check that `digest` looks like something this algorithm produces
    pub fn is_valid_digest(&self, digest: &str) -> bool {
        digest.len() == self.hex_len()
            && digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    pub fn hasher(&self) -> ContentHasher {
        match self {
            DigestAlgorithm::Sha1 => ContentHasher::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => ContentHasher::Sha256(sha2::Sha256::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = FreezeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            other => Err(FreezeError::Config(format!("Unknown digest algorithm: {}", other))),
        }
    }
}

/// Incremental hasher for one of the supported algorithms
pub enum ContentHasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Sha1(h) => h.update(data),
            ContentHasher::Sha256(h) => h.update(data),
        }
    }

    /// Lowercase hex digest
    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Sha1(h) => format!("{:x}", h.finalize()),
            ContentHasher::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Outcome of hashing one file
#[derive(Debug)]
pub enum FileDigest {
    Digest(String),
    /// The file could not be opened. Recoverable: the file is left out.
    Unopenable(std::io::Error),
}

/// Stream a file through `algorithm`.
///
/// Failing to open is reported as [`FileDigest::Unopenable`]. A read error
/// after a successful open means the file changed under us or storage failed,
/// and comes back as [`FreezeError::Read`].
pub async fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<FileDigest> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => return Ok(FileDigest::Unopenable(e)),
    };

    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|source| FreezeError::Read { path: path.to_path_buf(), source })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(FileDigest::Digest(hasher.finalize_hex()))
}
