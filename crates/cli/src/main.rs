// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agentbridge`: the CLI surface over the daemon's pidfile and config.
//! SPEC_FULL.md §6, "CLI surface".

mod color;
mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "agentbridge", version = env!("BUILD_GIT_HASH"), styles = color::styles())]
struct Cli {
    /// Output format for commands that print structured data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon in the foreground.
    Start {
        /// WebSocket/HTTP port to bind (default: config's `daemon.port`, 9876).
        #[arg(long)]
        port: Option<u16>,
        /// Skip starting a tunnel; advertise the LAN address instead.
        #[arg(long)]
        no_tunnel: bool,
        /// Override the remote API base URL for this run.
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Stop a running daemon.
    Stop,
    /// Report whether a daemon is running and summarize its session table.
    Status,
    /// Pair this workstation with the remote client, printing a code and QR payload.
    Link,
    /// Read or write the on-disk configuration.
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommand,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Start { port, no_tunnel, api_url } => {
            commands::start::run(port, no_tunnel, api_url).await
        }
        Command::Stop => commands::stop::run(cli.format).await,
        Command::Status => commands::status::run(cli.format).await,
        Command::Link => commands::link::run(cli.format).await,
        Command::Config { command } => commands::config::run(command, cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.code);
    }
}
