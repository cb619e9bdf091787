//! LinkGraph CLI: builds an article link graph from seed titles.
//!
//! Phase 1 fetches each seed's outbound links into the node table; phase 2
//! keeps the links whose destination is also a node and writes them as edges.

mod commands;

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
