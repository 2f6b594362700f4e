//! Init command: write a new freeze file

use anyhow::{Context, Result};
use freeze_core::{FreezeConfig, FreezeError, generate, snapshot};
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

use crate::cli::app::InitArgs;

pub async fn execute(args: InitArgs, root: &Path, mut config: FreezeConfig) -> Result<ExitCode> {
    if let Some(algorithm) = args.algorithm {
        config.algorithm = Some(algorithm);
    }

    let freeze_path = config.snapshot_path(root);

    // Refuse before spending time on hashing
    if !args.force {
        if let Err(e) = snapshot::ensure_absent(&freeze_path) {
            return Ok(refuse(&e));
        }
    }

    let scan = generate(root, &config)
        .await
        .with_context(|| format!("Failed to snapshot {}", root.display()))?;

    if !scan.unreadable.is_empty() {
        warn!("{} files could not be opened and were left out", scan.unreadable.len());
    }

    match scan.snapshot.save(&freeze_path, args.force) {
        Ok(()) => {}
        Err(e @ FreezeError::SnapshotExists(_)) => return Ok(refuse(&e)),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to write {}", freeze_path.display()));
        }
    }

    info!("Recorded {} files in {:?}", scan.snapshot.len(), freeze_path);
    Ok(ExitCode::SUCCESS)
}

fn refuse(err: &FreezeError) -> ExitCode {
    eprintln!("{}.", err);
    ExitCode::from(1)
}
