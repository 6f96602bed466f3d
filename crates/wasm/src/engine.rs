// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! The `wamr/wasip1` runtime engine over wasmtime.

use crate::exec_env::WasmExecEnv;
use crate::host;
use crate::pump::PumpMsg;
use ocre_core::{
    DispatchCall, Error, InstanceSpec, Result, RuntimeEngine, RuntimeInstance, StartGate,
};
use ocre_events::EventHub;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, error, info, warn};
use wasmtime::{Config, Instance, Linker, Module, Store, Trap, Val};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

/// Assigned name of the default WebAssembly runtime engine.
pub const RUNTIME_NAME: &str = "wamr/wasip1";

/// Exit code reported when the sandbox is torn down by `kill`.
const KILLED_EXIT_CODE: i32 = 137;

/// Exit code reported when the sandbox trapped or failed to come up.
const FAULT_EXIT_CODE: i32 = 1;

/// Per-store host state reachable from host imports.
pub(crate) struct GuestState {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) hub: Arc<EventHub>,
    pub(crate) module: Option<ocre_core::ModuleId>,
    pub(crate) stop: Arc<AtomicBool>,
}

pub struct WasmEngine {
    hub: Arc<EventHub>,
}

impl WasmEngine {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }
}

impl RuntimeEngine for WasmEngine {
    fn name(&self) -> &str {
        RUNTIME_NAME
    }

    fn create(&self, spec: &InstanceSpec) -> Result<Arc<dyn RuntimeInstance>> {
        // One wasmtime engine per container so an epoch bump (kill) cannot
        // leak into another sandbox.
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = wasmtime::Engine::new(&config).map_err(|e| Error::engine(e.to_string()))?;

        // The image is loaded and compiled once; restarts re-instantiate the
        // compiled module.
        let image = std::fs::read(&spec.image_path)?;
        let module = Module::new(&engine, &image)
            .map_err(|e| Error::engine(format!("invalid wasm image: {e:#}")))?;

        info!(image = %spec.image_path.display(), bytes = image.len(), "loaded wasm image");

        Ok(Arc::new(WasmInstance {
            engine,
            module,
            spec: spec.clone(),
            hub: Arc::clone(&self.hub),
            stop: Arc::new(AtomicBool::new(false)),
            pump_tx: Mutex::new(None),
        }))
    }
}

struct WasmInstance {
    engine: wasmtime::Engine,
    module: Module,
    spec: InstanceSpec,
    hub: Arc<EventHub>,
    stop: Arc<AtomicBool>,
    /// Present while a run is live; lets kill/stop reach the event pump.
    pump_tx: Mutex<Option<mpsc::Sender<PumpMsg>>>,
}

impl std::fmt::Debug for WasmInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmInstance")
            .field("spec", &self.spec)
            .finish()
    }
}

impl WasmInstance {
    fn build_wasi(&self) -> Result<WasiP1Ctx> {
        let mut builder = WasiCtxBuilder::new();
        builder.inherit_stdout().inherit_stderr();
        builder.args(&self.spec.argv);

        for pair in &self.spec.envp {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(Error::invalid_argument(format!(
                    "environment entry '{pair}' is not VAR=VAL"
                )));
            };
            builder.env(key, value);
        }

        // The per-container workdir becomes the sandbox root when the
        // filesystem capability was granted.
        if let Some(workdir) = &self.spec.workdir {
            if self.spec.has_capability("filesystem") {
                builder
                    .preopened_dir(workdir, "/", DirPerms::all(), FilePerms::all())
                    .map_err(|e| Error::engine(format!("preopen '{}': {e:#}", workdir.display())))?;
            }
        }

        // Mounts arrive as src:dst and are preopened individually.
        for mount in &self.spec.mounts {
            let Some((src, dst)) = mount.split_once(':') else {
                return Err(Error::invalid_argument(format!("invalid mount '{mount}'")));
            };
            builder
                .preopened_dir(src, dst, DirPerms::all(), FilePerms::all())
                .map_err(|e| Error::engine(format!("preopen '{src}': {e:#}")))?;
        }

        Ok(builder.build_p1())
    }

    /// Run one sandbox lifetime on the worker thread: instantiate, run
    /// `_start`, then pump dispatch calls for event-driven modules.
    fn run(&self, start: &StartGate) -> Result<i32> {
        self.stop.store(false, Ordering::SeqCst);

        let wasi = self.build_wasi()?;
        let mut store = Store::new(
            &self.engine,
            GuestState {
                wasi,
                hub: Arc::clone(&self.hub),
                module: None,
                stop: Arc::clone(&self.stop),
            },
        );
        // Trap as soon as the epoch is bumped past the current one.
        store.set_epoch_deadline(1);

        let mut linker: Linker<GuestState> = Linker::new(&self.engine);
        preview1::add_to_linker_sync(&mut linker, |state: &mut GuestState| &mut state.wasi)
            .map_err(|e| Error::engine(e.to_string()))?;
        host::add_to_linker(&mut linker).map_err(|e| Error::engine(e.to_string()))?;

        let (pump_tx, pump_rx) = mpsc::channel();
        let exec_env = Arc::new(WasmExecEnv::new(pump_tx.clone()));
        let module_id = self.hub.register_module(exec_env);
        store.data_mut().module = Some(module_id);
        *self.pump_tx.lock() = Some(pump_tx);

        let result = (|| {
            let instance = linker
                .instantiate(&mut store, &self.module)
                .map_err(|e| Error::engine(format!("instantiation failed: {e:#}")))?;

            // Instance exists and the epoch deadline is armed: kill is safe.
            start.open();

            let code = match self.call_start(&mut store, &instance) {
                RunOutcome::Exit(code) => code,
                RunOutcome::Killed => KILLED_EXIT_CODE,
                RunOutcome::Fault => FAULT_EXIT_CODE,
            };

            if code == 0
                && !self.stop.load(Ordering::SeqCst)
                && self.hub.registry().has_dispatchers(module_id)
            {
                debug!(module = %module_id, "entering event pump");
                return Ok(self.pump_events(&mut store, &instance, pump_rx));
            }

            Ok(code)
        })();

        *self.pump_tx.lock() = None;
        self.hub.unregister_module(module_id);
        result
    }

    fn call_start(&self, store: &mut Store<GuestState>, instance: &Instance) -> RunOutcome {
        let Ok(start) = instance.get_typed_func::<(), ()>(&mut *store, "_start") else {
            // A reactor-style module without _start is fine; it just goes
            // straight to the event pump.
            return RunOutcome::Exit(0);
        };

        match start.call(&mut *store, ()) {
            Ok(()) => RunOutcome::Exit(0),
            Err(e) => classify_trap(&e),
        }
    }

    /// Serialize dispatcher invocations and guest memory traffic through the
    /// thread owning the store.
    fn pump_events(
        &self,
        store: &mut Store<GuestState>,
        instance: &Instance,
        pump_rx: mpsc::Receiver<PumpMsg>,
    ) -> i32 {
        while let Ok(msg) = pump_rx.recv() {
            match msg {
                PumpMsg::Shutdown => {
                    return if self.stop.load(Ordering::SeqCst) { 0 } else { KILLED_EXIT_CODE };
                }
                PumpMsg::Dispatch { function, call } => {
                    match self.invoke_dispatcher(store, instance, &function, call) {
                        Ok(()) => {}
                        Err(outcome) => {
                            return match outcome {
                                RunOutcome::Killed => KILLED_EXIT_CODE,
                                RunOutcome::Exit(code) => code,
                                RunOutcome::Fault => FAULT_EXIT_CODE,
                            }
                        }
                    }
                }
                PumpMsg::CopyIn { bytes, reply } => {
                    let _ = reply.send(copy_into_guest(store, instance, &bytes));
                }
                PumpMsg::Free { offset } => {
                    free_in_guest(store, instance, offset);
                }
            }
        }
        // All senders gone: nothing can reach this sandbox anymore.
        0
    }

    fn invoke_dispatcher(
        &self,
        store: &mut Store<GuestState>,
        instance: &Instance,
        function: &str,
        call: DispatchCall,
    ) -> std::result::Result<(), RunOutcome> {
        let Some(func) = instance.get_func(&mut *store, function) else {
            warn!(function, "dispatcher export disappeared");
            return Ok(());
        };

        let args: Vec<Val> = match call {
            DispatchCall::Timer { timer_id } => vec![Val::I32(timer_id as i32)],
            DispatchCall::Gpio { pin, state } => {
                vec![Val::I32(pin as i32), Val::I32(state as i32)]
            }
            DispatchCall::Sensor { sensor_id, channel, value } => {
                vec![Val::I32(sensor_id as i32), Val::I32(channel as i32), Val::I32(value)]
            }
            DispatchCall::Message { message_id, topic, content_type, payload, payload_len } => {
                vec![
                    Val::I64(message_id as i64),
                    Val::I32(topic as i32),
                    Val::I32(content_type as i32),
                    Val::I32(payload as i32),
                    Val::I32(payload_len as i32),
                ]
            }
        };

        match func.call(&mut *store, &args, &mut []) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Any trap or exit inside a dispatcher ends the run.
                error!(function, error = %e, "dispatcher call failed");
                Err(classify_trap(&e))
            }
        }
    }
}

enum RunOutcome {
    Exit(i32),
    Killed,
    Fault,
}

fn classify_trap(e: &anyhow::Error) -> RunOutcome {
    if let Some(exit) = e.downcast_ref::<wasmtime_wasi::I32Exit>() {
        return RunOutcome::Exit(exit.0);
    }
    if let Some(trap) = e.downcast_ref::<Trap>() {
        if *trap == Trap::Interrupt {
            return RunOutcome::Killed;
        }
    }
    debug!(error = %e, "sandbox trapped");
    RunOutcome::Fault
}

/// Duplicate bytes into guest memory via the guest's exported allocator.
fn copy_into_guest(
    store: &mut Store<GuestState>,
    instance: &Instance,
    bytes: &[u8],
) -> Result<u32> {
    let malloc = instance
        .get_typed_func::<i32, i32>(&mut *store, "malloc")
        .map_err(|_| Error::Unsupported("guest allocator"))?;
    let memory = instance
        .get_memory(&mut *store, "memory")
        .ok_or(Error::Unsupported("guest memory"))?;

    let offset = malloc
        .call(&mut *store, bytes.len() as i32)
        .map_err(|e| Error::engine(format!("guest malloc: {e:#}")))?;
    if offset <= 0 {
        return Err(Error::ResourceExhausted("guest memory"));
    }

    memory
        .write(&mut *store, offset as usize, bytes)
        .map_err(|e| Error::engine(format!("guest memory write: {e}")))?;
    Ok(offset as u32)
}

fn free_in_guest(store: &mut Store<GuestState>, instance: &Instance, offset: u32) {
    if let Ok(free) = instance.get_typed_func::<i32, ()>(&mut *store, "free") {
        if free.call(&mut *store, offset as i32).is_err() {
            debug!(offset, "guest free trapped");
        }
    }
}

impl RuntimeInstance for WasmInstance {
    fn execute(&self, start: &StartGate) -> i32 {
        match self.run(start) {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "wasm run failed");
                FAULT_EXIT_CODE
            }
        }
    }

    fn kill(&self) -> Result<()> {
        // Trap any in-flight guest code, then stop the pump.
        self.engine.increment_epoch();
        if let Some(tx) = self.pump_tx.lock().as_ref() {
            let _ = tx.send(PumpMsg::Shutdown);
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(tx) = self.pump_tx.lock().as_ref() {
            let _ = tx.send(PumpMsg::Shutdown);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
