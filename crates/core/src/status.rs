// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Container lifecycle status.

use serde::{Deserialize, Serialize};

/// The observable status of a container.
///
/// `Exited` is transient: it means the worker thread has returned but has not
/// been reaped yet. The status accessor joins the worker and reports
/// `Stopped`, so `Exited` never escapes through the public API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    #[default]
    Unknown,
    /// Created but never started; the engine instance exists.
    Created,
    /// The worker thread is executing the sandbox.
    Running,
    /// Execution suspended by the engine.
    Paused,
    /// Worker returned, not yet joined.
    Exited,
    /// Worker joined; `exit_code` is valid.
    Stopped,
    /// A start failure left the container unusable except for removal.
    Error,
}

impl ContainerStatus {
    /// True for the states in which a container may be removed from its
    /// context.
    pub fn is_removable(self) -> bool {
        matches!(self, Self::Stopped | Self::Created | Self::Error)
    }

    /// True while a worker thread may still be producing an exit.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Exited => "exited",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
