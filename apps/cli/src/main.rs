//! NewsRouter CLI: multi-source headline aggregation with staged processing.
//!
//! Fetches headlines from named sources (live when credentials are present,
//! fallback samples otherwise) and routes them through summarization,
//! classification and category analysis stages.

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
