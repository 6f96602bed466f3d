// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! `ocre`: command-line client for the Ocre supervisor.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod exit_error;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ocre", about = "Ocre container runtime CLI", version)]
struct Cli {
    /// Daemon socket path
    #[arg(short = 'H', long = "host", global = true)]
    host: Option<PathBuf>,

    /// Working directory (image store, default daemon state)
    #[arg(short = 'w', long = "workdir", global = true)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage image files
    #[command(subcommand)]
    Image(commands::image::ImageCommand),

    /// Manage containers
    #[command(subcommand)]
    Container(commands::container::ContainerCommand),

    /// Manage the supervisor daemon
    #[command(subcommand)]
    Daemon(commands::daemon::DaemonCommand),
}

/// Resolved global options shared by all commands.
pub(crate) struct Globals {
    pub workdir: PathBuf,
    pub socket: PathBuf,
}

impl Globals {
    fn resolve(cli: &Cli) -> Self {
        let workdir = cli
            .workdir
            .clone()
            .unwrap_or_else(ocre_engine::workdir::default_workdir);
        let socket = cli.host.clone().unwrap_or_else(|| workdir.join("ocred.sock"));
        Self { workdir, socket }
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let globals = Globals::resolve(&cli);
    match cli.command {
        Command::Image(command) => commands::image::run(command, &globals).await,
        Command::Container(command) => commands::container::run(command, &globals).await,
        Command::Daemon(command) => commands::daemon::run(command, &globals).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}", e.message);
        std::process::exit(e.code);
    }
}
