use anyhow::Result;
use clap::Parser;

mod arxiv;
mod cli;
mod config;
mod error;
mod index;
mod ledger;
mod llm;
mod pdf;
mod pipeline;
mod runner;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let (command, config) = args.into_parts()?;

    cli::execute(command, config).await
}
