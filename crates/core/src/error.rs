// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Error kinds surfaced by the runtime core.

use crate::status::ContainerStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned synchronously through the library API.
///
/// Asynchronous failures (worker threads, dispatchers) are never surfaced as
/// errors; they are recorded in a container's status or exit code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cannot {op} container in state '{status}'")]
    WrongState {
        op: &'static str,
        status: ContainerStatus,
    },

    #[error("engine does not support {0}")]
    Unsupported(&'static str),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn wrong_state(op: &'static str, status: ContainerStatus) -> Self {
        Self::WrongState { op, status }
    }

    /// Short machine-readable kind, used by the wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid-argument",
            Self::NotFound(_) => "not-found",
            Self::Conflict(_) => "conflict",
            Self::WrongState { .. } => "wrong-state",
            Self::Unsupported(_) => "unsupported",
            Self::ResourceExhausted(_) => "resource-exhausted",
            Self::Engine(_) => "engine",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
