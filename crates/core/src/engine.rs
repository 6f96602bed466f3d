// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! The capability contract between the container core and a runtime engine.
//!
//! An engine registers under a unique name and manufactures opaque instances.
//! The container layer drives an instance strictly according to the lifecycle
//! rules: `execute` runs on a dedicated worker thread, `kill`/`stop` are
//! called from operator threads while the worker is live, and the instance is
//! dropped only once the container is no longer running or paused.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolved arguments for creating a runtime instance.
///
/// `argv` already carries the image path as its first element. Mounts are in
/// the external `src:dst` form; an engine that needs another shape rewrites
/// them internally.
#[derive(Debug, Clone, Default)]
pub struct InstanceSpec {
    /// Absolute path to the image file.
    pub image_path: PathBuf,
    /// Per-container working directory, present iff the `filesystem`
    /// capability was requested.
    pub workdir: Option<PathBuf>,
    /// Free-form permission strings, interpreted by the engine.
    pub capabilities: Vec<String>,
    pub argv: Vec<String>,
    /// `VAR=VAL` pairs.
    pub envp: Vec<String>,
    /// `<absolute-src>:<absolute-dst>` pairs, validated by the context.
    pub mounts: Vec<String>,
}

impl InstanceSpec {
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }
}

/// Binary gate posted by an engine once its instance is live enough to
/// accept `kill`.
///
/// `Container::start` blocks on the gate after spawning the worker. Opening
/// is idempotent; the worker wrapper also opens it when `execute` returns so
/// a failing engine can never leave `start` hanging.
#[derive(Default)]
pub struct StartGate {
    opened: Mutex<bool>,
    cond: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let mut opened = self.opened.lock();
        if !*opened {
            *opened = true;
            self.cond.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut opened = self.opened.lock();
        while !*opened {
            self.cond.wait(&mut opened);
        }
    }

    /// Wait with a timeout; true if the gate opened.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut opened = self.opened.lock();
        if *opened {
            return true;
        }
        self.cond.wait_for(&mut opened, timeout);
        *opened
    }
}

/// A registered runtime engine.
///
/// Descriptors are immutable after registration and borrowed by every
/// container that selects them.
pub trait RuntimeEngine: Send + Sync {
    /// Unique registry name, e.g. `wamr/wasip1`.
    fn name(&self) -> &str;

    /// Called once when the library initializes.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Called once when the library deinitializes.
    fn deinit(&self) -> Result<()> {
        Ok(())
    }

    /// Create a new instance for one container. The image buffer and any
    /// state needed to re-run the instance must live as long as the instance
    /// itself.
    fn create(&self, spec: &InstanceSpec) -> Result<Arc<dyn RuntimeInstance>>;
}

/// One live sandbox bound to one container.
///
/// Instance teardown is `Drop`; the container layer guarantees the drop only
/// happens while the instance is not executing.
pub trait RuntimeInstance: Send + Sync + std::fmt::Debug {
    /// Run the sandbox to completion and return its exit code.
    ///
    /// Called on the container's worker thread, possibly multiple times
    /// sequentially (restart). Must open `start` as soon as `kill` is safe.
    fn execute(&self, start: &StartGate) -> i32;

    /// Terminate the sandbox promptly; `execute` must return soon after.
    fn kill(&self) -> Result<()>;

    /// Cooperative shutdown. Optional.
    fn stop(&self) -> Result<()> {
        Err(Error::Unsupported("stop"))
    }

    /// Suspend execution. Optional.
    fn pause(&self) -> Result<()> {
        Err(Error::Unsupported("pause"))
    }

    /// Resume a paused sandbox. Optional.
    fn unpause(&self) -> Result<()> {
        Err(Error::Unsupported("unpause"))
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
