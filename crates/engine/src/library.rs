// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Process-wide library state: the runtime-engine registry and the root list
//! of contexts.
//!
//! `initialize`/`deinitialize` are an explicit pair; nested initialization is
//! refused. The default WebAssembly engine is always registered first, then
//! any caller-supplied engines.

use crate::context::Context;
use crate::workdir;
use ocre_core::{Error, Result, RuntimeEngine};
use ocre_events::{EventHub, HubConfig};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Immutable engine registry, shared with every context.
pub(crate) struct EngineSet {
    engines: Vec<Arc<dyn RuntimeEngine>>,
}

impl EngineSet {
    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn RuntimeEngine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// The default engine is always the first registered one.
    pub(crate) fn default_engine(&self) -> Arc<dyn RuntimeEngine> {
        Arc::clone(&self.engines[0])
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }
}

#[cfg(test)]
impl EngineSet {
    pub(crate) fn for_tests(engines: Vec<Arc<dyn RuntimeEngine>>) -> Arc<Self> {
        Arc::new(Self { engines })
    }
}

/// Configuration for [`Ocre::initialize`].
#[derive(Default)]
pub struct OcreConfig {
    /// Additional runtime engines to register after the default one.
    pub extra_runtimes: Vec<Arc<dyn RuntimeEngine>>,
    /// Event subsystem sizing and backends.
    pub hub: HubConfig,
    /// Workdir used when `create_context` is called without one.
    pub default_workdir: Option<PathBuf>,
}

struct ContextNode {
    context: Arc<Context>,
    workdir: PathBuf,
}

/// Handle to the initialized library. Dropping it deinitializes.
pub struct Ocre {
    engines: Arc<EngineSet>,
    contexts: Mutex<Vec<ContextNode>>,
    hub: Arc<EventHub>,
    default_workdir: PathBuf,
    torn_down: AtomicBool,
}

impl std::fmt::Debug for Ocre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ocre")
            .field("default_workdir", &self.default_workdir)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl Ocre {
    /// Initialize the library: start the event hub, register the default
    /// WebAssembly engine plus any extras, and run every engine's `init`.
    ///
    /// If any `init` fails, the engines initialized so far are deinitialized
    /// and the call fails. Only one live library per process.
    pub fn initialize(config: OcreConfig) -> Result<Self> {
        if INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::conflict("library already initialized"));
        }

        let hub = EventHub::start(config.hub);

        let mut engines: Vec<Arc<dyn RuntimeEngine>> =
            vec![Arc::new(ocre_wasm::WasmEngine::new(Arc::clone(&hub)))];

        for extra in config.extra_runtimes {
            if engines.iter().any(|e| e.name() == extra.name()) {
                hub.shutdown();
                INITIALIZED.store(false, Ordering::SeqCst);
                return Err(Error::conflict(format!(
                    "runtime '{}' already registered",
                    extra.name()
                )));
            }
            info!(runtime = extra.name(), "registered runtime");
            engines.push(extra);
        }

        for index in 0..engines.len() {
            if let Err(e) = engines[index].init() {
                error!(runtime = engines[index].name(), error = %e, "runtime init failed");
                for initialized in &engines[..index] {
                    if let Err(e) = initialized.deinit() {
                        warn!(runtime = initialized.name(), error = %e, "runtime deinit failed");
                    }
                }
                hub.shutdown();
                INITIALIZED.store(false, Ordering::SeqCst);
                return Err(e);
            }
            info!(runtime = engines[index].name(), "initialized runtime");
        }

        Ok(Self {
            engines: Arc::new(EngineSet { engines }),
            contexts: Mutex::new(Vec::new()),
            hub,
            default_workdir: config.default_workdir.unwrap_or_else(workdir::default_workdir),
            torn_down: AtomicBool::new(false),
        })
    }

    /// The event hub backing this library instance.
    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Create a context rooted at `workdir` (the compiled default when
    /// absent). Contexts cannot share a workdir.
    pub fn create_context(&self, workdir: Option<&Path>) -> Result<Arc<Context>> {
        let workdir = match workdir {
            Some(path) => path.to_path_buf(),
            None => {
                info!(path = %self.default_workdir.display(), "using default working directory");
                self.default_workdir.clone()
            }
        };

        let mut contexts = self.contexts.lock();
        if contexts.iter().any(|n| n.workdir == workdir) {
            return Err(Error::conflict(format!(
                "a context already uses working directory '{}'",
                workdir.display()
            )));
        }

        workdir::populate_workdir(&workdir)?;
        workdir::purge_container_dirs(&workdir)?;

        let context = Arc::new(Context::new(workdir.clone(), Arc::clone(&self.engines)));
        contexts.push(ContextNode { context: Arc::clone(&context), workdir });
        Ok(context)
    }

    /// Tear a context down and remove it from the library.
    pub fn destroy_context(&self, context: &Arc<Context>) -> Result<()> {
        let mut contexts = self.contexts.lock();
        let index = contexts
            .iter()
            .position(|n| Arc::ptr_eq(&n.context, context))
            .ok_or_else(|| Error::not_found("context"))?;
        let node = contexts.remove(index);
        drop(contexts);

        node.context.destroy();
        Ok(())
    }

    pub fn context_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Linear lookup in the engine registry.
    pub fn get_runtime(&self, name: &str) -> Option<Arc<dyn RuntimeEngine>> {
        self.engines.get(name)
    }

    pub fn runtime_names(&self) -> Vec<String> {
        self.engines.names()
    }

    /// Destroy all contexts, deinitialize every engine, and stop the event
    /// hub. Errors are logged, never surfaced; afterwards the library can be
    /// initialized again.
    pub fn deinitialize(self) {
        drop(self);
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let nodes = std::mem::take(&mut *self.contexts.lock());
        for node in nodes {
            node.context.destroy();
        }

        for engine in &self.engines.engines {
            if let Err(e) = engine.deinit() {
                warn!(runtime = engine.name(), error = %e, "runtime deinit failed");
            }
        }

        self.hub.shutdown();
        INITIALIZED.store(false, Ordering::SeqCst);
        info!("library deinitialized");
    }
}

impl Drop for Ocre {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "library_tests.rs"]
mod tests;
