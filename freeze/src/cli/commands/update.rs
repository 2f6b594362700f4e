//! Update command placeholder

use anyhow::Result;
use std::process::ExitCode;
use tracing::info;

use crate::cli::app::UpdateArgs;

/// Accepts its arguments and leaves the freeze file alone
pub async fn execute(_args: UpdateArgs) -> Result<ExitCode> {
    info!("Update is not implemented yet, freeze file left unchanged");
    Ok(ExitCode::SUCCESS)
}
