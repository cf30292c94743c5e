//! # helix
//!
//! Command-line entry point for HelixAgent.

mod cli;
mod commands;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run_cli()
}
