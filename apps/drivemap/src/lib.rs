// Deny unused code to catch dead code early
#![deny(unused)]
// Warn on unused dependencies to catch platform-specific cfg mismatches
#![warn(unused_crate_dependencies)]
// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Boot-time agent that converges EBS volumes to the drive letters and labels their tags ask for.

pub mod boot;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metadata;
pub mod scripts;
pub mod tags;
pub mod windows;

use cli::{Cli, Command};
use config::AgentConfig;
use log::error;
use serde::Serialize;
use std::io::{self, Write};
use std::process::ExitCode;

/// Exit code for an unusable config. Everything else exits 0 so the boot carries on.
const EXIT_CONFIG: u8 = 2;

pub fn run(cli: Cli) -> ExitCode {
    let config = AgentConfig::load(cli.config.as_deref());
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    logging::init(&level);

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if cli.dry_run {
        config.dry_run = true;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => write_json(&boot::run(&config)),
        Command::Plan => match boot::plan(&config) {
            Ok(report) => write_json(&report),
            Err(e) => error!("{}", e),
        },
        Command::Topology => match boot::topology(&config) {
            Ok(topology) => write_json(&topology),
            Err(e) => error!("{}", e),
        },
    }
    ExitCode::SUCCESS
}

fn write_json<T: Serialize>(value: &T) {
    let mut stdout = io::stdout().lock();
    let result = serde_json::to_writer_pretty(&mut stdout, value)
        .map_err(io::Error::from)
        .and_then(|()| writeln!(stdout));
    if let Err(e) = result {
        error!("Couldn't write output: {}", e);
    }
}
