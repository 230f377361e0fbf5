//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "drivemap", version, about = "Gives tagged EBS volumes stable drive letters and labels")]
pub struct Cli {
    /// Config file (default: C:\ProgramData\drivemap\config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log changes instead of applying them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log level: error, warn, info, debug, trace, off
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Full boot run: online disks, remap, startup scripts (default)
    Run,
    /// Show the changes a run would make, without making them
    Plan,
    /// Print the volumes as the agent sees them
    Topology,
}
