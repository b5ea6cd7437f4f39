//! CLI definition
//!
//! Uses `clap` derive API. The surface is a single default action (build
//! everything once, then watch and serve), so there are only flags, no
//! subcommands.

use std::path::PathBuf;

use clap::Parser;

/// assetpipe - watch-and-serve asset build pipeline
#[derive(Parser, Debug)]
#[command(name = "assetpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to assetpipe.toml config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Dev server port (overrides [serve].port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Delete the output root before the initial build
    #[arg(long)]
    pub clean: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all but error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
