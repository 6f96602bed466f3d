// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! `ocre container` subcommands, forwarded to the daemon.

use crate::client::Client;
use crate::exit_error::ExitError;
use crate::Globals;
use clap::{Args, Subcommand};
use ocre_wire::{Request, ResponseBody};

#[derive(Args, Debug, Clone)]
pub struct CreateOptions {
    /// Detach: return immediately instead of blocking until exit
    #[arg(short = 'd', long = "detach")]
    detached: bool,

    /// Container name (auto-generated when omitted)
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Runtime engine name
    #[arg(short = 'r', long = "runtime")]
    runtime: Option<String>,

    /// Mount SRC:DST (repeatable)
    #[arg(short = 'v', long = "volume")]
    mounts: Vec<String>,

    /// Grant a capability (repeatable)
    #[arg(short = 'k', long = "capability")]
    capabilities: Vec<String>,

    /// Set an environment variable VAR=VAL (repeatable)
    #[arg(short = 'e', long = "env")]
    env: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Create a container without starting it
    Create {
        #[command(flatten)]
        options: CreateOptions,
        image: String,
        /// Arguments passed to the container
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Create and start a container
    Run {
        #[command(flatten)]
        options: CreateOptions,
        image: String,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Start a created or stopped container
    Start { id: String },
    /// Request a graceful stop
    Stop { id: String },
    /// Kill a running container
    Kill { id: String },
    /// Wait for a container to exit and print its exit code
    Wait { id: String },
    /// Pause a running container
    Pause { id: String },
    /// Resume a paused container
    Unpause { id: String },
    /// List containers (or one container by ID)
    Ps { id: Option<String> },
    /// Remove a container
    Rm { id: String },
}

fn create_request(options: &CreateOptions, image: String, args: Vec<String>) -> Request {
    Request::ContainerCreate {
        image,
        runtime: options.runtime.clone(),
        id: options.name.clone(),
        detached: options.detached,
        argv: args,
        envp: options.env.clone(),
        capabilities: options.capabilities.clone(),
        mounts: options.mounts.clone(),
    }
}

fn expect_id(body: ResponseBody) -> Result<String, ExitError> {
    match body {
        ResponseBody::Id(id) => Ok(id),
        other => Err(ExitError::failure(format!("unexpected response: {other:?}"))),
    }
}

pub async fn run(command: ContainerCommand, globals: &Globals) -> Result<(), ExitError> {
    let client = Client::new(&globals.socket);
    match command {
        ContainerCommand::Create { options, image, args } => {
            let id = expect_id(client.call(create_request(&options, image, args)).await?)?;
            println!("{id}");
            Ok(())
        }

        ContainerCommand::Run { options, image, args } => {
            let detached = options.detached;
            let id = expect_id(client.call(create_request(&options, image, args)).await?)?;
            if detached {
                client.call(Request::ContainerStart { id: id.clone() }).await?;
                println!("{id}");
            } else {
                // Foreground run: the response arrives when the container
                // exits.
                client.call_blocking(Request::ContainerStart { id }).await?;
            }
            Ok(())
        }

        ContainerCommand::Start { id } => {
            client.call_blocking(Request::ContainerStart { id }).await?;
            Ok(())
        }

        ContainerCommand::Stop { id } => {
            client.call(Request::ContainerStop { id }).await?;
            Ok(())
        }

        ContainerCommand::Kill { id } => {
            client.call(Request::ContainerKill { id }).await?;
            Ok(())
        }

        ContainerCommand::Wait { id } => {
            match client.call_blocking(Request::ContainerWait { id }).await? {
                ResponseBody::ExitCode(code) => {
                    println!("{code}");
                    Ok(())
                }
                other => Err(ExitError::failure(format!("unexpected response: {other:?}"))),
            }
        }

        ContainerCommand::Pause { id } => {
            client.call(Request::ContainerPause { id }).await?;
            Ok(())
        }

        ContainerCommand::Unpause { id } => {
            client.call(Request::ContainerUnpause { id }).await?;
            Ok(())
        }

        ContainerCommand::Ps { id } => {
            let entries = match client.call(Request::ContainerList).await? {
                ResponseBody::Containers(entries) => entries,
                other => {
                    return Err(ExitError::failure(format!("unexpected response: {other:?}")))
                }
            };
            let mut found = id.is_none();
            for entry in entries {
                if let Some(id) = &id {
                    if entry.id != *id {
                        continue;
                    }
                    found = true;
                }
                println!("{}\t{}\t{}", entry.id, entry.status, entry.image);
            }
            if !found {
                return Err(ExitError::failure(format!(
                    "not found: container '{}'",
                    id.unwrap_or_default()
                )));
            }
            Ok(())
        }

        ContainerCommand::Rm { id } => {
            client.call(Request::ContainerRemove { id }).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
