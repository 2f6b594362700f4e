use anyhow::Result;
use clap::Parser;
use freeze_core::FreezeConfig;
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

/// Exit status for fatal errors
const FAILURE_EXIT_CODE: u8 = 2;

fn main() -> ExitCode {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse_from(cli::app::normalize_args(std::env::args_os()));

    // Diagnostics go to stderr so stdout only carries drift lines
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        3.. => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let root = cli.directory;

    // Process commands
    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Init(args) => {
            debug!("Init command: {:?}", args);
            let config = load_config(&root, cli.config.as_deref(), cli.workers)?;
            runtime.block_on(cli::commands::init::execute(args, &root, config))
        }
        Commands::Check(args) => {
            debug!("Check command: {:?}", args);
            let config = load_config(&root, cli.config.as_deref(), cli.workers)?;
            runtime.block_on(cli::commands::check::execute(args, &root, config))
        }
        Commands::Update(args) => {
            // No-op, so a broken config must not make it fail
            debug!("Update command: {:?}", args);
            runtime.block_on(cli::commands::update::execute(args))
        }
    }
}

fn load_config(root: &Path, explicit: Option<&Path>, workers: Option<usize>) -> Result<FreezeConfig> {
    let mut config = FreezeConfig::discover(root, explicit)?;
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()?;
    debug!("Using configuration: {:?}", config);
    Ok(config)
}
