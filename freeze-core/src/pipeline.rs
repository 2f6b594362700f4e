//! Concurrent hashing pipeline
//!
//! ```text
//! walk_tree ──▶ [paths: bounded(cap)] ──▶ worker 0..W ──▶ [results: bounded(cap)] ──▶ collector
//! ```
//!
//! The walk runs on a blocking thread and stalls when the path queue is full,
//! so at most `cap` paths and `cap` results are in flight regardless of tree
//! size. Shutdown order matters: the path queue is closed once the walk is
//! done, every worker is joined, and only then is the result queue closed.
//! Closing results before the join could let the collector finish while a
//! worker still holds an unsent result.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::config::FreezeConfig;
use crate::digest::{DigestAlgorithm, FileDigest, digest_file};
use crate::enumerate::walk_tree;
use crate::error::{FreezeError, Result};
use crate::snapshot::Snapshot;

/// One file waiting to be hashed
#[derive(Debug, Clone)]
pub struct HashTask {
    pub key: String,
    pub path: PathBuf,
}

/// A digest produced by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResult {
    pub key: String,
    pub digest: String,
}

#[derive(Debug)]
enum WorkerOutput {
    Hashed(HashResult),
    Unreadable(String),
}

/// Everything a single generate run produced
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    /// Files that were found but could not be opened. Never in `snapshot`.
    pub unreadable: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    hashed: usize,
    unreadable: usize,
}

/// Hash every regular, non-hidden file under `root`.
///
/// Open failures are logged and collected in [`ScanOutcome::unreadable`].
/// A traversal error or a read error after open aborts the whole run and no
/// partial snapshot is returned.
pub async fn generate(root: &Path, config: &FreezeConfig) -> Result<ScanOutcome> {
    config.validate()?;

    let started = Instant::now();
    let algorithm = config.algorithm();
    let capacity = config.queue_capacity();
    info!(
        "Hashing {:?} with {} workers ({}, queue capacity {})",
        root, config.workers, algorithm, capacity
    );

    let (task_tx, task_rx) = async_channel::bounded::<HashTask>(capacity);
    let (result_tx, result_rx) = mpsc::channel::<WorkerOutput>(capacity);

    let mut workers = JoinSet::new();
    for id in 0..config.workers {
        workers.spawn(hash_worker(id, algorithm, task_rx.clone(), result_tx.clone()));
    }
    drop(task_rx);

    let collector = tokio::spawn(collect_results(algorithm, result_rx));

    let walk_root = root.to_path_buf();
    let freeze_path = config.snapshot_path(root);
    let producer =
        tokio::task::spawn_blocking(move || enqueue_tree(&walk_root, &freeze_path, task_tx));

    // The producer closes the path queue when it returns, whatever the outcome
    let walked = producer.await?;

    let mut stats = WorkerStats::default();
    let mut worker_error = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(worker)) => {
                stats.hashed += worker.hashed;
                stats.unreadable += worker.unreadable;
            }
            Ok(Err(e)) => {
                worker_error.get_or_insert(e);
            }
            Err(e) => {
                worker_error.get_or_insert(e.into());
            }
        }
    }

    // All workers are gone; this drops the last sender
    drop(result_tx);
    let outcome = collector.await?;

    let enqueued = walked?;
    if let Some(e) = worker_error {
        return Err(e);
    }

    info!(
        "Hashed {} of {} files in {:.2?} ({} unreadable)",
        stats.hashed,
        enqueued,
        started.elapsed(),
        stats.unreadable
    );
    Ok(outcome)
}

/// Walk the tree and feed the path queue, blocking while it is full.
///
/// The freeze file at `freeze_path` is never enqueued, whatever its name.
/// Returns the number of paths enqueued. Stops early without error if the
/// queue was closed by a failing worker.
fn enqueue_tree(
    root: &Path,
    freeze_path: &Path,
    tasks: async_channel::Sender<HashTask>,
) -> Result<usize> {
    let mut enqueued = 0;
    for entry in walk_tree(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tasks.close();
                return Err(e);
            }
        };

        if entry.path == freeze_path {
            trace!("Skipping freeze file {}", entry.key);
            continue;
        }

        if tasks.send_blocking(HashTask { key: entry.key, path: entry.path }).is_err() {
            debug!("Path queue closed, stopping walk after {} files", enqueued);
            break;
        }
        enqueued += 1;
    }

    tasks.close();
    debug!("Walk finished, {} files enqueued", enqueued);
    Ok(enqueued)
}

async fn hash_worker(
    id: usize,
    algorithm: DigestAlgorithm,
    tasks: async_channel::Receiver<HashTask>,
    results: mpsc::Sender<WorkerOutput>,
) -> Result<WorkerStats> {
    let mut stats = WorkerStats::default();

    while let Ok(task) = tasks.recv().await {
        let output = match digest_file(&task.path, algorithm).await {
            Ok(FileDigest::Digest(digest)) => {
                trace!("{} {}", digest, task.key);
                stats.hashed += 1;
                WorkerOutput::Hashed(HashResult { key: task.key, digest })
            }
            Ok(FileDigest::Unopenable(e)) => {
                warn!("Failed to open {}: {}", task.key, e);
                stats.unreadable += 1;
                WorkerOutput::Unreadable(task.key)
            }
            Err(e) => {
                // Stop the walk and the other workers
                tasks.close();
                return Err(e);
            }
        };

        if results.send(output).await.is_err() {
            return Err(FreezeError::Worker("result collector stopped early".to_string()));
        }
    }

    debug!("Worker {} done: {} hashed, {} unreadable", id, stats.hashed, stats.unreadable);
    Ok(stats)
}

async fn collect_results(
    algorithm: DigestAlgorithm,
    mut results: mpsc::Receiver<WorkerOutput>,
) -> ScanOutcome {
    let mut outcome = ScanOutcome { snapshot: Snapshot::new(algorithm), unreadable: BTreeSet::new() };

    while let Some(output) = results.recv().await {
        match output {
            WorkerOutput::Hashed(result) => {
                outcome.snapshot.insert(result.key, result.digest);
            }
            WorkerOutput::Unreadable(key) => {
                outcome.unreadable.insert(key);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn small_config(workers: usize) -> FreezeConfig {
        FreezeConfig { workers, ..Default::default() }
    }

    fn sha1_of(data: &[u8]) -> String {
        let mut hasher = DigestAlgorithm::Sha1.hasher();
        hasher.update(data);
        hasher.finalize_hex()
    }

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("etc/app")).unwrap();
        fs::create_dir_all(root.join(".git/refs")).unwrap();
        fs::write(root.join("VERSION"), "1.2.3\n").unwrap();
        fs::write(root.join("etc/app/main.conf"), "listen = 80\n").unwrap();
        fs::write(root.join("etc/app/empty"), "").unwrap();
        fs::write(root.join("etc/.secret"), "hidden").unwrap();
        fs::write(root.join(".freeze"), "{}").unwrap();
        fs::write(root.join(".git/refs/main"), "abc").unwrap();
    }

    #[tokio::test]
    async fn test_generate_is_complete_and_skips_hidden() {
        let temp_dir = TempDir::new().unwrap();
        build_tree(temp_dir.path());

        let outcome = generate(temp_dir.path(), &small_config(4)).await.unwrap();
        let snapshot = outcome.snapshot;

        let paths: Vec<_> = snapshot.paths().collect();
        assert_eq!(paths, vec!["VERSION", "etc/app/empty", "etc/app/main.conf"]);
        assert_eq!(snapshot.get("VERSION"), Some(sha1_of(b"1.2.3\n").as_str()));
        assert_eq!(
            snapshot.get("etc/app/empty"),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
        assert!(outcome.unreadable.is_empty());
    }

    #[tokio::test]
    async fn test_generate_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        build_tree(temp_dir.path());

        let first = generate(temp_dir.path(), &small_config(3)).await.unwrap();
        let second = generate(temp_dir.path(), &FreezeConfig::default()).await.unwrap();
        assert_eq!(first.snapshot, second.snapshot);
    }

    #[tokio::test]
    async fn test_generate_empty_tree() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = generate(temp_dir.path(), &small_config(2)).await.unwrap();
        assert!(outcome.snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_generate_with_sha256() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("abc"), "abc").unwrap();

        let config = FreezeConfig { algorithm: Some(DigestAlgorithm::Sha256), ..Default::default() };
        let outcome = generate(temp_dir.path(), &config).await.unwrap();
        assert_eq!(outcome.snapshot.algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(
            outcome.snapshot.get("abc"),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_files_through_small_queues() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in 0..100 {
            let dir_path = root.join(format!("d{:03}", dir));
            fs::create_dir(&dir_path).unwrap();
            for file in 0..100 {
                fs::write(dir_path.join(format!("f{:03}", file)), format!("{}-{}", dir, file))
                    .unwrap();
            }
        }

        let outcome = generate(root, &FreezeConfig::default()).await.unwrap();
        let snapshot = outcome.snapshot;
        assert_eq!(snapshot.len(), 10_000);
        assert_eq!(snapshot.get("d042/f017"), Some(sha1_of(b"42-17").as_str()));
        assert_eq!(snapshot.get("d099/f099"), Some(sha1_of(b"99-99").as_str()));

        // Queue capacity of one forces every stage to wait on the next
        let tight = FreezeConfig { workers: 64, queue_capacity: Some(1), ..Default::default() };
        let again = generate(root, &tight).await.unwrap();
        assert_eq!(again.snapshot, snapshot);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unopenable_file_is_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for i in 0..20 {
            fs::write(root.join(format!("file{:02}", i)), format!("content {}", i)).unwrap();
        }
        let locked = root.join("file07");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not stop a privileged user
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let outcome = generate(root, &small_config(8)).await.unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(outcome.snapshot.len(), 19);
        assert!(!outcome.snapshot.contains("file07"));
        assert!(outcome.snapshot.contains("file06"));
        assert_eq!(outcome.unreadable, BTreeSet::from(["file07".to_string()]));
    }

    #[tokio::test]
    async fn test_missing_root_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let err = generate(&temp_dir.path().join("missing"), &small_config(2)).await.unwrap_err();
        assert!(matches!(err, FreezeError::Traversal { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_aborts() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("ok.txt"), "ok").unwrap();
        let locked = root.join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("inner.txt"), "inner").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = generate(root, &small_config(2)).await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(FreezeError::Traversal { .. })));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = generate(temp_dir.path(), &small_config(0)).await.unwrap_err();
        assert!(matches!(err, FreezeError::Config(_)));
    }

    #[tokio::test]
    async fn test_freeze_file_is_skipped_under_any_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("state")).unwrap();
        fs::write(root.join("app.conf"), "x").unwrap();
        fs::write(root.join("state/freeze.json"), "{}").unwrap();
        fs::write(root.join("state/other.json"), "{}").unwrap();

        let config = FreezeConfig {
            workers: 2,
            snapshot_file: PathBuf::from("state/freeze.json"),
            ..Default::default()
        };
        let outcome = generate(root, &config).await.unwrap();

        let paths: Vec<_> = outcome.snapshot.paths().collect();
        assert_eq!(paths, vec!["app.conf", "state/other.json"]);
    }

    fn task(root: &Path, key: &str) -> HashTask {
        HashTask { key: key.to_string(), path: root.join(key) }
    }

    #[tokio::test]
    async fn test_file_deleted_after_enumeration_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for i in 0..10 {
            fs::write(root.join(format!("f{}", i)), format!("data {}", i)).unwrap();
        }

        let (task_tx, task_rx) = async_channel::bounded(16);
        let (result_tx, result_rx) = mpsc::channel(16);
        for i in 0..10 {
            task_tx.send(task(root, &format!("f{}", i))).await.unwrap();
        }
        task_tx.close();

        // Gone between the walk and the open
        fs::remove_file(root.join("f4")).unwrap();

        let collector = tokio::spawn(collect_results(DigestAlgorithm::Sha1, result_rx));
        let mut workers = JoinSet::new();
        for id in 0..3 {
            let (tasks, results) = (task_rx.clone(), result_tx.clone());
            workers.spawn(hash_worker(id, DigestAlgorithm::Sha1, tasks, results));
        }
        drop(result_tx);

        let mut unreadable = 0;
        while let Some(joined) = workers.join_next().await {
            unreadable += joined.unwrap().unwrap().unreadable;
        }
        let outcome = collector.await.unwrap();

        assert_eq!(unreadable, 1);
        assert_eq!(outcome.unreadable, BTreeSet::from(["f4".to_string()]));
        assert_eq!(outcome.snapshot.len(), 9);
        assert!(!outcome.snapshot.contains("f4"));
        assert_eq!(outcome.snapshot.get("f7"), Some(sha1_of(b"data 7").as_str()));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_read_error_is_fatal_and_closes_queue() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        // Opening a directory succeeds on Linux, reading it fails
        fs::create_dir(root.join("not-a-file")).unwrap();
        fs::write(root.join("after"), "never hashed").unwrap();

        let (task_tx, task_rx) = async_channel::bounded(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        task_tx.send(task(root, "not-a-file")).await.unwrap();
        task_tx.send(task(root, "after")).await.unwrap();

        let result = hash_worker(0, DigestAlgorithm::Sha1, task_rx.clone(), result_tx).await;

        assert!(matches!(result, Err(FreezeError::Read { .. })));
        assert!(task_rx.is_closed());
        assert!(task_tx.send(task(root, "late")).await.is_err());
        // Nothing was emitted for the failed file, the rest is left to drain
        assert!(result_rx.recv().await.is_none());
        assert_eq!(task_rx.len(), 1);
    }
}
