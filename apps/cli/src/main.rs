//! bylines CLI: scrape reporter bylines from news sources and keep a
//! contact directory in sync.
//!
//! One invocation processes one configured source end-to-end.

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
