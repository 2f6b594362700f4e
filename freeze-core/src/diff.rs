//! Drift classification between a stored and a fresh snapshot

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::config::FreezeConfig;
use crate::error::{FreezeError, Result};
use crate::pipeline::{ScanOutcome, generate};
use crate::snapshot::Snapshot;

/// How a path drifted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    /// Present in both, digests differ
    Modified,
    /// Only in the stored snapshot
    Missing,
    /// Found on disk but could not be opened
    Unreadable,
    /// Only in the fresh snapshot
    New,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::Modified => "modified",
            DriftKind::Missing => "missing",
            DriftKind::Unreadable => "unreadable",
            DriftKind::New => "new",
        }
    }
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disjoint sets of drifted paths. Unchanged paths are not listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub modified: BTreeSet<String>,
    pub missing: BTreeSet<String>,
    pub unreadable: BTreeSet<String>,
    pub new: BTreeSet<String>,
}

impl DiffReport {
    pub fn is_clean(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.missing.len() + self.unreadable.len() + self.new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_clean()
    }

    /// All entries, grouped by kind and sorted by path within each group
    pub fn entries(&self) -> impl Iterator<Item = (&str, DriftKind)> {
        tagged(&self.modified, DriftKind::Modified)
            .chain(tagged(&self.missing, DriftKind::Missing))
            .chain(tagged(&self.unreadable, DriftKind::Unreadable))
            .chain(tagged(&self.new, DriftKind::New))
    }

    pub fn kind_of(&self, path: &str) -> Option<DriftKind> {
        self.entries().find(|(p, _)| *p == path).map(|(_, kind)| kind)
    }
}

fn tagged(set: &BTreeSet<String>, kind: DriftKind) -> impl Iterator<Item = (&str, DriftKind)> {
    set.iter().map(move |path| (path.as_str(), kind))
}

/// Classify every path of `expected` and `actual`.
///
/// Paths of `expected` are matched against a working copy of `actual` and
/// removed from it once seen; whatever is left over is new.
pub fn diff(expected: &Snapshot, actual: &Snapshot) -> DiffReport {
    let mut report = DiffReport::default();
    let mut remaining: BTreeMap<&str, &str> = actual.iter().collect();

    for (path, digest) in expected.iter() {
        match remaining.remove(path) {
            Some(current) if current != digest => {
                report.modified.insert(path.to_string());
            }
            Some(_) => {}
            None => {
                report.missing.insert(path.to_string());
            }
        }
    }

    report.new.extend(remaining.into_keys().map(str::to_string));
    report
}

/// Compare a stored snapshot with a fresh scan.
///
/// Paths the scan found but could not open are reported as unreadable
/// rather than missing or new.
pub fn verify(expected: &Snapshot, scan: &ScanOutcome) -> Result<DiffReport> {
    if expected.algorithm() != scan.snapshot.algorithm() {
        return Err(FreezeError::AlgorithmMismatch {
            stored: expected.algorithm(),
            configured: scan.snapshot.algorithm(),
        });
    }

    let mut report = diff(expected, &scan.snapshot);
    for path in &scan.unreadable {
        report.missing.remove(path);
        report.new.remove(path);
        report.unreadable.insert(path.clone());
    }
    Ok(report)
}

/// Generate a fresh snapshot of `root` and verify it against `expected`.
///
/// The fresh snapshot uses the stored algorithm. A configured algorithm that
/// disagrees is an error rather than a wall of `modified` lines.
pub async fn check_tree(
    root: &Path,
    config: &FreezeConfig,
    expected: &Snapshot,
) -> Result<DiffReport> {
    if let Some(configured) = config.algorithm {
        if configured != expected.algorithm() {
            return Err(FreezeError::AlgorithmMismatch { stored: expected.algorithm(), configured });
        }
    }

    let config = FreezeConfig { algorithm: Some(expected.algorithm()), ..config.clone() };
    let scan = generate(root, &config).await?;
    let report = verify(expected, &scan)?;

    info!(
        "{} modified, {} missing, {} unreadable, {} new",
        report.modified.len(),
        report.missing.len(),
        report.unreadable.len(),
        report.new.len()
    );
    Ok(report)
}
