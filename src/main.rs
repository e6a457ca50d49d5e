mod auth;
mod cli;
mod config;
mod error;
mod jira;
mod output;
mod sync;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = match cli.verbosity() {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if !cli.is_quiet() {
        output::print_banner();
    }

    info!("Starting jpd-sync");
    cli.execute().await
}
