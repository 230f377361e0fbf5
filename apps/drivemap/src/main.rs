use clap::Parser;
use drivemap_lib::cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    drivemap_lib::run(Cli::parse())
}
