// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! One-shot request/response client for the daemon socket.

use crate::exit_error::ExitError;
use ocre_wire::{read_response, write_request, Request, Response, ResponseBody};
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;

/// Timeout for quick control operations.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for operations that legitimately block (wait, foreground start).
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Client<'a> {
    socket: &'a Path,
}

impl<'a> Client<'a> {
    pub fn new(socket: &'a Path) -> Self {
        Self { socket }
    }

    pub async fn call(&self, request: Request) -> Result<ResponseBody, ExitError> {
        self.call_with_timeout(request, CONTROL_TIMEOUT).await
    }

    /// For wait-like requests whose response only arrives when the container
    /// exits.
    pub async fn call_blocking(&self, request: Request) -> Result<ResponseBody, ExitError> {
        self.call_with_timeout(request, BLOCKING_TIMEOUT).await
    }

    async fn call_with_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<ResponseBody, ExitError> {
        let stream = UnixStream::connect(self.socket).await.map_err(|e| {
            ExitError::failure(format!(
                "cannot connect to daemon at '{}': {e} (is ocred running?)",
                self.socket.display()
            ))
        })?;
        let (mut reader, mut writer) = stream.into_split();

        write_request(&mut writer, &request, CONTROL_TIMEOUT)
            .await
            .map_err(|e| ExitError::failure(format!("request failed: {e}")))?;

        let response = read_response(&mut reader, timeout)
            .await
            .map_err(|e| ExitError::failure(format!("response failed: {e}")))?;

        match response {
            Response::Ok { body, .. } => Ok(body),
            Response::Err { message, .. } => Err(ExitError::failure(message)),
        }
    }
}
