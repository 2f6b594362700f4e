//! Check command: compare the tree against the freeze file

use anyhow::{Context, Result};
use freeze_core::{DiffReport, FreezeConfig, Snapshot, check_tree};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use crate::cli::app::CheckArgs;

/// Exit status when drift was found
const DRIFT_EXIT_CODE: u8 = 1;

pub async fn execute(args: CheckArgs, root: &Path, config: FreezeConfig) -> Result<ExitCode> {
    let freeze_path = config.snapshot_path(root);
    let stored = Snapshot::load(&freeze_path)
        .with_context(|| format!("Failed to load {}", freeze_path.display()))?;

    let report = check_tree(root, &config, &stored)
        .await
        .with_context(|| format!("Failed to check {}", root.display()))?;

    let mut stdout = io::stdout().lock();
    write_report(&mut stdout, &report, args.json)?;
    stdout.flush()?;

    Ok(if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::from(DRIFT_EXIT_CODE) })
}

/// One `<path> <kind>` line per drifted path, or the whole report as JSON
pub fn write_report(out: &mut impl Write, report: &DiffReport, json: bool) -> io::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    for (path, kind) in report.entries() {
        writeln!(out, "{} {}", path, kind)?;
    }
    Ok(())
}
