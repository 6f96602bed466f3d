// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! One container: a lifecycle state machine around one runtime instance and
//! one worker thread.
//!
//! The container mutex is held on every state transition. The worker runs
//! the sandbox outside the lock, and on return flips the status to `Exited`
//! and broadcasts the exit condvar. `Exited` is resolved to `Stopped` by the
//! status accessor, which is the only place that joins the worker; every
//! other operation routes through it before reading a final state, which is
//! what makes the join exactly-once no matter which caller observes the exit
//! first.

use ocre_core::{
    ContainerStatus, Error, InstanceSpec, Result, RuntimeEngine, RuntimeInstance, StartGate,
};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Caller-supplied container arguments.
#[derive(Debug, Clone, Default)]
pub struct ContainerArgs {
    pub argv: Vec<String>,
    /// `VAR=VAL` pairs.
    pub envp: Vec<String>,
    /// Free-form permission strings, interpreted by the engine.
    pub capabilities: Vec<String>,
    /// `<absolute-src>:<absolute-dst>` pairs.
    pub mounts: Vec<String>,
}

struct LifeState {
    status: ContainerStatus,
    exit_code: i32,
    worker: Option<JoinHandle<i32>>,
}

pub struct Container {
    id: String,
    /// Image basename, stripped of any path.
    image: String,
    runtime_name: String,
    detached: bool,
    instance: Arc<dyn RuntimeInstance>,
    state: Mutex<LifeState>,
    cond_exit: Condvar,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("image", &self.image)
            .field("runtime_name", &self.runtime_name)
            .field("detached", &self.detached)
            .finish()
    }
}

impl Container {
    /// Create a container bound to `engine`. The engine instance is created
    /// here; the container enters `Created` on success.
    pub fn create(
        id: &str,
        detached: bool,
        engine: &Arc<dyn RuntimeEngine>,
        spec: InstanceSpec,
    ) -> Result<Arc<Self>> {
        let image = spec
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_argument("image path has no file name"))?;

        let instance = engine.create(&spec)?;

        info!(id, runtime = engine.name(), image = %spec.image_path.display(), "created container");

        Ok(Arc::new(Self {
            id: id.to_string(),
            image,
            runtime_name: engine.name().to_string(),
            detached,
            instance,
            state: Mutex::new(LifeState {
                status: ContainerStatus::Created,
                exit_code: 0,
                worker: None,
            }),
            cond_exit: Condvar::new(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    pub fn detached(&self) -> bool {
        self.detached
    }

    /// Resolve the transient `Exited` state. Must run with the state lock
    /// held; this is the only join site for the worker thread.
    fn resolve_exited_locked(&self, state: &mut LifeState) {
        if state.status != ContainerStatus::Exited {
            return;
        }
        if let Some(worker) = state.worker.take() {
            if worker.join().is_err() {
                error!(id = %self.id, "worker thread panicked");
            }
        }
        state.status = ContainerStatus::Stopped;
    }

    /// The container's status, with `Exited` resolved to `Stopped`.
    pub fn status(&self) -> ContainerStatus {
        let mut state = self.state.lock();
        self.resolve_exited_locked(&mut state);
        state.status
    }

    /// Exit code of the last run; only meaningful in `Stopped`.
    pub fn exit_code(&self) -> Option<i32> {
        let mut state = self.state.lock();
        self.resolve_exited_locked(&mut state);
        match state.status {
            ContainerStatus::Stopped => Some(state.exit_code),
            _ => None,
        }
    }

    /// Start the container: spawn the worker, wait for the engine to signal
    /// that the instance is live, then (non-detached) wait for exit.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let gate = Arc::new(StartGate::new());

        {
            let mut state = self.state.lock();
            self.resolve_exited_locked(&mut state);
            if !matches!(state.status, ContainerStatus::Created | ContainerStatus::Stopped) {
                return Err(Error::wrong_state("start", state.status));
            }

            let container = Arc::clone(self);
            let gate = Arc::clone(&gate);
            let spawned = std::thread::Builder::new()
                .name(format!("ocre-container-{}", self.id))
                .spawn(move || container.worker_body(&gate));

            match spawned {
                Ok(worker) => {
                    state.worker = Some(worker);
                    state.status = ContainerStatus::Running;
                }
                Err(e) => {
                    state.status = ContainerStatus::Error;
                    error!(id = %self.id, error = %e, "failed to spawn worker thread");
                    return Err(Error::Io(e));
                }
            }
        }

        info!(id = %self.id, "waiting for container to start");

        // The engine opens the gate once kill is safe; the worker wrapper
        // opens it on return, so this cannot hang on a broken engine.
        gate.wait();

        info!(id = %self.id, runtime = %self.runtime_name, "started container");

        if !self.detached {
            self.wait()?;
        }

        Ok(())
    }

    /// Worker thread body: run the sandbox outside the container lock, then
    /// record the exit.
    fn worker_body(self: Arc<Self>, gate: &StartGate) -> i32 {
        let code = self.instance.execute(gate);
        gate.open();

        let mut state = self.state.lock();
        // The only place the status is set to Exited.
        state.status = ContainerStatus::Exited;
        state.exit_code = code;
        info!(id = %self.id, code, "container exited");
        self.cond_exit.notify_all();
        code
    }

    /// Block until the container has exited and return its exit code.
    pub fn wait(&self) -> Result<i32> {
        let mut state = self.state.lock();

        if matches!(state.status, ContainerStatus::Unknown | ContainerStatus::Created) {
            return Err(Error::wrong_state("wait", state.status));
        }

        while state.status.is_live() {
            self.cond_exit.wait(&mut state);
        }

        self.resolve_exited_locked(&mut state);

        match state.status {
            ContainerStatus::Stopped => Ok(state.exit_code),
            status => Err(Error::wrong_state("wait", status)),
        }
    }

    /// Status gate shared by the signal operations. The engine call itself
    /// happens after the lock is released.
    fn check_live(&self, op: &'static str, accept_paused: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.resolve_exited_locked(&mut state);
        let ok = state.status == ContainerStatus::Running
            || (accept_paused && state.status == ContainerStatus::Paused);
        if !ok {
            return Err(Error::wrong_state(op, state.status));
        }
        Ok(())
    }

    /// Forward a graceful-shutdown request to the engine.
    pub fn stop(&self) -> Result<()> {
        self.check_live("stop", false)?;
        info!(id = %self.id, "sending stop signal");
        self.instance.stop()
    }

    /// Terminate the sandbox. The state flips to `Exited` when the worker
    /// returns, not here.
    pub fn kill(&self) -> Result<()> {
        self.check_live("kill", true)?;
        self.instance.kill()?;
        info!(id = %self.id, "sent kill signal");
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.check_live("pause", false)?;
        self.instance.pause()?;

        let mut state = self.state.lock();
        // The worker may have exited while the engine was pausing; never
        // overwrite a terminal state.
        if state.status == ContainerStatus::Running {
            state.status = ContainerStatus::Paused;
            info!(id = %self.id, "paused container");
        }
        Ok(())
    }

    pub fn unpause(&self) -> Result<()> {
        {
            let state = self.state.lock();
            if state.status != ContainerStatus::Paused {
                return Err(Error::wrong_state("unpause", state.status));
            }
        }
        self.instance.unpause()?;

        let mut state = self.state.lock();
        if state.status == ContainerStatus::Paused {
            state.status = ContainerStatus::Running;
            info!(id = %self.id, "unpaused container");
        }
        Ok(())
    }

    /// Check that the container may be torn down.
    pub(crate) fn ensure_removable(&self) -> Result<()> {
        let status = self.status();
        if !status.is_removable() {
            warn!(id = %self.id, %status, "container is in use");
            return Err(Error::wrong_state("remove", status));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
