//! FeedScout CLI: discover, validate and score multilingual content feeds.
//!
//! Each `run` proposes candidate feeds, validates them, retrieves accepted
//! content and folds the outcomes into the persistent trust store.

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
