// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Module registry: per-sandbox context for event dispatch and resource
//! accounting.
//!
//! A module registers when its sandbox is instantiated and unregisters on
//! teardown. Unregistration runs the per-resource-type cleanup handlers so no
//! host-side timer, pin callback, or subscription outlives its module.

use ocre_core::{Clock, DispatchCall, Error, ModuleId, ResourceKind, Result, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Execution environment of one live sandbox.
///
/// The seam between host-side dispatch and guest code: invoking a registered
/// callback, and duplicating/freeing buffers in the sandbox's linear memory.
pub trait ExecEnv: Send + Sync {
    /// Invoke the guest function `function` with the packed event arguments.
    ///
    /// Best-effort: the module may be torn down concurrently, in which case
    /// the implementation returns an error and the dispatcher drops the
    /// event.
    fn dispatch(&self, function: &str, call: DispatchCall) -> Result<()>;

    /// Copy `bytes` into the sandbox's linear memory, returning the guest
    /// offset.
    fn copy_in(&self, bytes: &[u8]) -> Result<u32>;

    /// Release a buffer previously produced by `copy_in`.
    fn free(&self, offset: u32);
}

/// Handler invoked on module unregistration to reclaim one resource type.
pub type CleanupHandler = Box<dyn Fn(ModuleId) + Send + Sync>;

struct ModuleContext {
    exec_env: Arc<dyn ExecEnv>,
    resource_count: [u32; ResourceKind::COUNT],
    dispatchers: [Option<String>; ResourceKind::COUNT],
    last_activity: u64,
}

/// Resolution of an owner lookup during dispatch.
pub enum DispatchTarget {
    Call {
        function: String,
        exec_env: Arc<dyn ExecEnv>,
    },
    UnknownModule,
    NoDispatcher,
}

pub struct Registry {
    modules: Mutex<HashMap<ModuleId, ModuleContext>>,
    cleanup: Mutex<[Option<CleanupHandler>; ResourceKind::COUNT]>,
    next_id: Mutex<u64>,
    clock: Arc<dyn Clock>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            modules: Mutex::new(HashMap::new()),
            cleanup: Mutex::new([None, None, None, None]),
            next_id: Mutex::new(1),
            clock,
        }
    }

    /// Install the cleanup handler for one resource kind. Called once per
    /// kind when the resource managers come up.
    pub fn set_cleanup_handler(&self, kind: ResourceKind, handler: CleanupHandler) {
        self.cleanup.lock()[kind.index()] = Some(handler);
    }

    /// Insert a live module and hand back its registry handle.
    pub fn register(&self, exec_env: Arc<dyn ExecEnv>) -> ModuleId {
        let id = {
            let mut next = self.next_id.lock();
            let id = ModuleId(*next);
            *next += 1;
            id
        };
        let context = ModuleContext {
            exec_env,
            resource_count: [0; ResourceKind::COUNT],
            dispatchers: [None, None, None, None],
            last_activity: self.clock.epoch_ms(),
        };
        self.modules.lock().insert(id, context);
        info!(module = %id, "module registered");
        id
    }

    /// Run cleanup handlers for the module, then remove it.
    ///
    /// The handlers run while the module is still registered (they decrement
    /// its counters) and without the membership lock held.
    pub fn unregister(&self, module: ModuleId) {
        if !self.modules.lock().contains_key(&module) {
            warn!(module = %module, "unregister of unknown module");
            return;
        }

        for kind in ResourceKind::ALL {
            let handlers = self.cleanup.lock();
            if let Some(handler) = &handlers[kind.index()] {
                handler(module);
            }
        }

        let outstanding = self.outstanding(module);
        if outstanding.iter().any(|&c| c > 0) {
            warn!(module = %module, ?outstanding, "resources leaked past cleanup");
        }

        self.modules.lock().remove(&module);
        info!(module = %module, "module unregistered");
    }

    pub fn is_registered(&self, module: ModuleId) -> bool {
        self.modules.lock().contains_key(&module)
    }

    pub fn module_count(&self) -> usize {
        self.modules.lock().len()
    }

    /// Record the guest function dispatched for one resource kind.
    pub fn register_dispatcher(
        &self,
        module: ModuleId,
        kind: ResourceKind,
        function: &str,
    ) -> Result<()> {
        if function.is_empty() {
            return Err(Error::invalid_argument("empty dispatcher name"));
        }
        let mut modules = self.modules.lock();
        let context = modules
            .get_mut(&module)
            .ok_or_else(|| Error::not_found(format!("module {module}")))?;
        context.dispatchers[kind.index()] = Some(function.to_string());
        debug!(module = %module, kind = %kind, function, "dispatcher registered");
        Ok(())
    }

    /// Snapshot the dispatcher and execution environment for an owner.
    ///
    /// The caller invokes the callback after this returns, with no registry
    /// lock held.
    pub fn dispatch_target(&self, module: ModuleId, kind: ResourceKind) -> DispatchTarget {
        let modules = self.modules.lock();
        let Some(context) = modules.get(&module) else {
            return DispatchTarget::UnknownModule;
        };
        match &context.dispatchers[kind.index()] {
            Some(function) => DispatchTarget::Call {
                function: function.clone(),
                exec_env: Arc::clone(&context.exec_env),
            },
            None => DispatchTarget::NoDispatcher,
        }
    }

    /// True if the module registered at least one dispatcher.
    pub fn has_dispatchers(&self, module: ModuleId) -> bool {
        self.modules
            .lock()
            .get(&module)
            .map(|c| c.dispatchers.iter().any(|d| d.is_some()))
            .unwrap_or(false)
    }

    pub fn exec_env(&self, module: ModuleId) -> Option<Arc<dyn ExecEnv>> {
        self.modules.lock().get(&module).map(|c| Arc::clone(&c.exec_env))
    }

    pub fn increment_resource_count(&self, module: ModuleId, kind: ResourceKind) {
        if let Some(context) = self.modules.lock().get_mut(&module) {
            context.resource_count[kind.index()] += 1;
        }
    }

    pub fn decrement_resource_count(&self, module: ModuleId, kind: ResourceKind) {
        if let Some(context) = self.modules.lock().get_mut(&module) {
            let count = &mut context.resource_count[kind.index()];
            if *count > 0 {
                *count -= 1;
            }
        }
    }

    pub fn resource_count(&self, module: ModuleId, kind: ResourceKind) -> u32 {
        self.modules
            .lock()
            .get(&module)
            .map(|c| c.resource_count[kind.index()])
            .unwrap_or(0)
    }

    /// All four counters for a module; zeros if unknown.
    pub fn outstanding(&self, module: ModuleId) -> [u32; ResourceKind::COUNT] {
        self.modules
            .lock()
            .get(&module)
            .map(|c| c.resource_count)
            .unwrap_or_default()
    }

    /// Stamp the module's last-activity time.
    pub fn touch(&self, module: ModuleId) {
        let now = self.clock.epoch_ms();
        if let Some(context) = self.modules.lock().get_mut(&module) {
            context.last_activity = now;
        }
    }

    pub fn last_activity(&self, module: ModuleId) -> Option<u64> {
        self.modules.lock().get(&module).map(|c| c.last_activity)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
