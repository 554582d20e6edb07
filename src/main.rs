mod changelist;
mod cli;
mod commands;
mod config;
mod context;
mod git;
mod prompt;
mod review;

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing::{debug, info_span};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use context::Context;
use git::GitCli;
use review::ReviewClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let _main_span = info_span!("git_cl", command = ?cli.command).entered();

    let ctx = Context::new(Box::new(GitCli::new()), Box::new(ReviewClient::new()));

    match commands::run(&ctx, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            eprintln!("{}", err.to_string().red());
            ExitCode::FAILURE
        }
    }
}
