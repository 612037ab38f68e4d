//! # Cleanser Command Line
//!
//! ```bash
//! cleanser infer data.csv
//! cleanser preview data.csv --rules rules.json
//! cleanser run data.csv --rules rules.json --export export.json --output out/
//! ```
//!
//! Logs go to stderr and to the rotating files under the data directory;
//! command results go to stdout.

#![warn(clippy::all, rust_2018_idioms)]

mod cli;

use anyhow::{Context as _, Result};
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cleanser::logging::init(cli.log_dir.clone())?;

    tokio::runtime::Runtime::new()
        .context("Failed to start tokio runtime")?
        .block_on(cli::run_command(cli))
}
