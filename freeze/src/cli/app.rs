use clap::{Parser, Subcommand};
use freeze_core::DigestAlgorithm;
use std::ffi::OsString;
use std::path::PathBuf;

/// Older freeze scripts spell the overwrite flag `-force`
const LEGACY_FORCE_FLAG: &str = "-force";

#[derive(Parser, Debug)]
#[command(
    name = "freeze",
    version,
    about = "Freeze - record a directory tree and detect drift",
    long_about = "Freeze hashes every regular, non-hidden file under a directory into a freeze file, and later reports which files were modified, removed, added, or can no longer be read."
)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file (defaults to .freeze.toml in the tree root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root of the tree to snapshot
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub directory: PathBuf,

    /// Number of concurrent hash workers
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the freeze file
    #[command(about = "Hash the tree and write a new freeze file")]
    Init(InitArgs),

    /// Validate files against the freeze file
    #[command(about = "Compare the tree against the freeze file and list drifted paths")]
    Check(CheckArgs),

    /// Update the freeze file
    #[command(about = "Update the freeze file (not implemented yet)")]
    Update(UpdateArgs),
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing freeze file
    #[arg(short, long, help = "Overwrite the freeze file if it already exists (-force also accepted)")]
    pub force: bool,

    /// Digest algorithm for the new freeze file
    #[arg(long, help = "Digest algorithm (sha1 or sha256)")]
    pub algorithm: Option<DigestAlgorithm>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Print the drift report as JSON
    #[arg(long, help = "Print the drift report as JSON instead of one line per path")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct UpdateArgs {}

/// Rewrite `-force` to `--force` so clap does not read it as `-f -o -r -c -e`
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| if arg == LEGACY_FORCE_FLAG { OsString::from("--force") } else { arg })
        .collect()
}
