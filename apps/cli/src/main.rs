//! SkillForge CLI — batch runner for an external skill-generation workflow.
//!
//! Runs N iterations of a topic-driven generation command with bounded
//! concurrency, retries, per-attempt timeouts, artifact collection, and a
//! deterministic run report.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
