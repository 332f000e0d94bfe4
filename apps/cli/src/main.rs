//! Devize CLI: quote aggregation and pricing for construction projects.
//!
//! Turns selected operations and their recipes into priced material and
//! labor lines, and keeps per-project standards and overrides in a local
//! database.

mod commands;
mod render;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
