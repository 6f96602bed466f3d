// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! `ocre daemon` subcommands: manage the `ocred` process.

use crate::client::Client;
use crate::exit_error::ExitError;
use crate::Globals;
use clap::Subcommand;
use ocre_wire::Request;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Start ocred in the background
    Start,
    /// Ask a running ocred to shut down
    Stop,
    /// Check whether ocred is reachable
    Status,
}

pub async fn run(command: DaemonCommand, globals: &Globals) -> Result<(), ExitError> {
    let client = Client::new(&globals.socket);
    match command {
        DaemonCommand::Start => {
            if client.call(Request::Ping).await.is_ok() {
                return Err(ExitError::failure("daemon is already running"));
            }

            let exe = daemon_binary()?;
            std::process::Command::new(&exe)
                .arg("-H")
                .arg(&globals.socket)
                .arg("-w")
                .arg(&globals.workdir)
                .spawn()
                .map_err(|e| {
                    ExitError::failure(format!("cannot start '{}': {e}", exe.display()))
                })?;

            // Give it a moment to bind, then verify.
            for _ in 0..50 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if client.call(Request::Ping).await.is_ok() {
                    println!("ocred started");
                    return Ok(());
                }
            }
            Err(ExitError::failure("daemon did not come up"))
        }

        DaemonCommand::Stop => {
            client.call(Request::Shutdown).await?;
            println!("ocred stopping");
            Ok(())
        }

        DaemonCommand::Status => match client.call(Request::Ping).await {
            Ok(_) => {
                println!("ocred is running");
                Ok(())
            }
            Err(_) => Err(ExitError::failure("ocred is not running")),
        },
    }
}

/// `ocred` is expected next to the `ocre` binary, falling back to PATH.
fn daemon_binary() -> Result<std::path::PathBuf, ExitError> {
    if let Ok(current) = std::env::current_exe() {
        let sibling = current.with_file_name("ocred");
        if sibling.is_file() {
            return Ok(sibling);
        }
    }
    Ok(std::path::PathBuf::from("ocred"))
}
