// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! swarm: command-line front end for the local swarm agent.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod color;
mod commands;
mod exit_error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{agent, cache};
use crate::exit_error::ExitError;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "swarm", version, about = "Control the local swarm agent")]
#[command(styles = color::styles())]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the agent (background unless --foreground)
    Start {
        /// Run in the foreground
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the agent, closing every connection
    #[command(alias = "shutdown")]
    Stop,
    /// Show connections, jobs and cache usage
    Status,
    /// Check that the agent answers
    Ping,
    /// Re-read agent.toml
    Reload,
    /// Cache maintenance
    Cache(cache::CacheArgs),
    /// Print CLI and agent protocol versions
    Version,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output;
    match cli.command {
        Command::Start { foreground } => agent::start(foreground).await,
        Command::Stop => agent::stop(format).await,
        Command::Status => agent::status(format).await,
        Command::Ping => agent::ping(format).await,
        Command::Reload => agent::reload(format).await,
        Command::Cache(args) => cache::cache(args, format).await,
        Command::Version => agent::version(format).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<ExitError>().map(|x| x.code).unwrap_or(1);
            eprintln!("Error: {}", e);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
