mod auth;
mod cli;
mod config;
mod error;
mod events;
mod output;
mod providers;
mod runner;
mod watch;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting buildevents {}", env!("CARGO_PKG_VERSION"));
    cli.execute().await
}
