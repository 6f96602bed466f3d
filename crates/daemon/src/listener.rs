// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Listener task for handling socket I/O.
//!
//! Each connection carries one request and one response. Long-running
//! operations (wait, non-detached start) run on blocking tasks; a client
//! that disconnects mid-request cancels the handler.

use crate::env::ipc_timeout;
use ocre_core::Error;
use ocre_engine::{Container, ContainerArgs, Context, CreateRequest};
use ocre_wire::{
    read_request, write_response, ContainerEntry, ProtocolError, Request, Response, ResponseBody,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub context: Arc<Context>,
    pub shutdown: Arc<Notify>,
}

/// Accept loop; spawns one task per connection.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Run until shutdown is notified.
    pub async fn run(self) {
        let shutdown = Arc::clone(&self.ctx.shutdown);
        loop {
            tokio::select! {
                result = self.unix.accept() => match result {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            if let Err(e) = handle_connection(reader, writer, &ctx).await {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!("accept error: {}", e),
                },
                _ = shutdown.notified() => {
                    info!("listener stopping");
                    return;
                }
            }
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => debug!("connection timed out"),
        other => error!("connection error: {}", other),
    }
}

/// Handle a single client connection: one request, one response.
///
/// The handler races against client disconnect; a vanished client cancels
/// any pending work instead of leaving an orphaned responder.
pub async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let request = read_request(&mut reader, ipc_timeout()).await?;
    info!(request = ?request, "received request");

    let response = tokio::select! {
        response = handle_request(request, ctx) => response,
        _ = detect_client_disconnect(&mut reader) => {
            debug!("client disconnected, dropping handler");
            return Ok(());
        }
    };

    debug!(response = ?response, "sending response");
    write_response(&mut writer, &response, ipc_timeout()).await?;
    Ok(())
}

/// In the one-shot protocol the client sends nothing after its request, so
/// any read completion means EOF (disconnect).
async fn detect_client_disconnect<R: AsyncReadExt + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

fn failure(op: u64, e: &Error) -> Response {
    Response::err(op, e.kind(), e.to_string())
}

fn find_container(ctx: &ListenCtx, op: u64, id: &str) -> Result<Arc<Container>, Box<Response>> {
    ctx.context.get_container_by_id(id).ok_or_else(|| {
        Box::new(failure(op, &Error::not_found(format!("container '{id}'"))))
    })
}

/// Map one request onto the library API.
pub async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    let op = request.opcode();
    match request {
        Request::Ping => Response::ok(op, ResponseBody::Empty),

        Request::ContainerCreate {
            image,
            runtime,
            id,
            detached,
            argv,
            envp,
            capabilities,
            mounts,
        } => {
            let create = CreateRequest {
                image,
                runtime,
                id,
                detached,
                args: ContainerArgs { argv, envp, capabilities, mounts },
            };
            match ctx.context.create_container(create) {
                Ok(container) => {
                    Response::ok(op, ResponseBody::Id(container.id().to_string()))
                }
                Err(e) => failure(op, &e),
            }
        }

        Request::ContainerStart { id } => {
            let container = match find_container(ctx, op, &id) {
                Ok(container) => container,
                Err(response) => return *response,
            };
            // Non-detached start blocks until the container exits.
            let result = tokio::task::spawn_blocking(move || container.start()).await;
            match result {
                Ok(Ok(())) => Response::ok(op, ResponseBody::Empty),
                Ok(Err(e)) => failure(op, &e),
                Err(e) => Response::err(op, "engine", format!("start task failed: {e}")),
            }
        }

        Request::ContainerStop { id } => match find_container(ctx, op, &id) {
            Ok(container) => match container.stop() {
                Ok(()) => Response::ok(op, ResponseBody::Empty),
                Err(e) => failure(op, &e),
            },
            Err(response) => *response,
        },

        Request::ContainerKill { id } => match find_container(ctx, op, &id) {
            Ok(container) => match container.kill() {
                Ok(()) => Response::ok(op, ResponseBody::Empty),
                Err(e) => failure(op, &e),
            },
            Err(response) => *response,
        },

        Request::ContainerPause { id } => match find_container(ctx, op, &id) {
            Ok(container) => match container.pause() {
                Ok(()) => Response::ok(op, ResponseBody::Empty),
                Err(e) => failure(op, &e),
            },
            Err(response) => *response,
        },

        Request::ContainerUnpause { id } => match find_container(ctx, op, &id) {
            Ok(container) => match container.unpause() {
                Ok(()) => Response::ok(op, ResponseBody::Empty),
                Err(e) => failure(op, &e),
            },
            Err(response) => *response,
        },

        Request::ContainerWait { id } => {
            let container = match find_container(ctx, op, &id) {
                Ok(container) => container,
                Err(response) => return *response,
            };
            let result = tokio::task::spawn_blocking(move || container.wait()).await;
            match result {
                Ok(Ok(code)) => Response::ok(op, ResponseBody::ExitCode(code)),
                Ok(Err(e)) => failure(op, &e),
                Err(e) => Response::err(op, "engine", format!("wait task failed: {e}")),
            }
        }

        Request::ContainerStatus { id } => match find_container(ctx, op, &id) {
            Ok(container) => {
                Response::ok(op, ResponseBody::Status(container.status().to_string()))
            }
            Err(response) => *response,
        },

        Request::ContainerRemove { id } => match ctx.context.remove_container_by_id(&id) {
            Ok(()) => Response::ok(op, ResponseBody::Empty),
            Err(e) => failure(op, &e),
        },

        Request::ContainerList => {
            let entries = ctx
                .context
                .containers()
                .iter()
                .map(|c| ContainerEntry {
                    id: c.id().to_string(),
                    status: c.status().to_string(),
                    image: c.image().to_string(),
                })
                .collect();
            Response::ok(op, ResponseBody::Containers(entries))
        }

        Request::Shutdown => {
            ctx.shutdown.notify_waiters();
            Response::ok(op, ResponseBody::Empty)
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
