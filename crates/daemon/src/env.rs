// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Centralized environment variable access for the daemon.

use std::path::PathBuf;
use std::time::Duration;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen address: `<workdir>/ocred.sock`.
pub fn default_socket_path(workdir: &std::path::Path) -> PathBuf {
    workdir.join("ocred.sock")
}

/// Default PID file: `<workdir>/ocred.pid`.
pub fn default_pid_path(workdir: &std::path::Path) -> PathBuf {
    workdir.join("ocred.pid")
}

/// IPC timeout (override with `OCRE_IPC_TIMEOUT_MS`).
pub fn ipc_timeout() -> Duration {
    std::env::var("OCRE_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
