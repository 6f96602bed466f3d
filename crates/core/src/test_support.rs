// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Test builders and fixtures shared across the workspace's tests.
//!
//! `FakeEngine` stands in for a real runtime engine: instances either exit on
//! their own after a configured delay or run until killed, and capability
//! support (`stop`, `pause`) is opt-in so tests can exercise the
//! `Unsupported` paths.

#![allow(clippy::unwrap_used)]

use crate::engine::{InstanceSpec, RuntimeEngine, RuntimeInstance, StartGate};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A configurable in-process engine for lifecycle tests.
pub struct FakeEngine {
    name: String,
    run_for: Option<Duration>,
    exit_code: i32,
    supports_stop: bool,
    supports_pause: bool,
    init_error: Option<String>,
    create_error: Option<String>,
    init_calls: AtomicUsize,
    deinit_calls: AtomicUsize,
    instances: Mutex<Vec<Arc<FakeInstance>>>,
}

impl FakeEngine {
    /// Instances exit immediately with code 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_for: Some(Duration::ZERO),
            exit_code: 0,
            supports_stop: false,
            supports_pause: false,
            init_error: None,
            create_error: None,
            init_calls: AtomicUsize::new(0),
            deinit_calls: AtomicUsize::new(0),
            instances: Mutex::new(Vec::new()),
        }
    }

    /// Instances run until killed or stopped.
    pub fn long_running(name: impl Into<String>) -> Self {
        let mut engine = Self::new(name);
        engine.run_for = None;
        engine
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_run_for(mut self, duration: Duration) -> Self {
        self.run_for = Some(duration);
        self
    }

    pub fn with_stop(mut self) -> Self {
        self.supports_stop = true;
        self
    }

    pub fn with_pause(mut self) -> Self {
        self.supports_pause = true;
        self
    }

    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }

    pub fn failing_create(mut self, message: impl Into<String>) -> Self {
        self.create_error = Some(message.into());
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn deinit_calls(&self) -> usize {
        self.deinit_calls.load(Ordering::SeqCst)
    }

    /// Instances created so far, in creation order.
    pub fn instances(&self) -> Vec<Arc<FakeInstance>> {
        self.instances.lock().clone()
    }
}

impl RuntimeEngine for FakeEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        match &self.init_error {
            Some(message) => Err(Error::engine(message.clone())),
            None => Ok(()),
        }
    }

    fn deinit(&self) -> Result<()> {
        self.deinit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create(&self, spec: &InstanceSpec) -> Result<Arc<dyn RuntimeInstance>> {
        if let Some(message) = &self.create_error {
            return Err(Error::engine(message.clone()));
        }

        let instance = Arc::new(FakeInstance {
            spec: spec.clone(),
            run_for: self.run_for,
            exit_code: self.exit_code,
            supports_stop: self.supports_stop,
            supports_pause: self.supports_pause,
            signal: Mutex::new(RunSignal::default()),
            cond: Condvar::new(),
            kill_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
        });
        self.instances.lock().push(Arc::clone(&instance));
        Ok(instance)
    }
}

#[derive(Debug, Default)]
struct RunSignal {
    interrupted: bool,
    paused: bool,
}

/// Instance produced by [`FakeEngine`].
#[derive(Debug)]
pub struct FakeInstance {
    spec: InstanceSpec,
    run_for: Option<Duration>,
    exit_code: i32,
    supports_stop: bool,
    supports_pause: bool,
    signal: Mutex<RunSignal>,
    cond: Condvar,
    kill_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    execute_calls: AtomicUsize,
}

impl FakeInstance {
    pub fn spec(&self) -> &InstanceSpec {
        &self.spec
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    fn interrupt(&self) {
        let mut signal = self.signal.lock();
        signal.interrupted = true;
        self.cond.notify_all();
    }
}

impl RuntimeInstance for FakeInstance {
    fn execute(&self, start: &StartGate) -> i32 {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        {
            // Reset interrupt state so the instance can be restarted.
            let mut signal = self.signal.lock();
            signal.interrupted = false;
        }
        start.open();

        let deadline = self.run_for.map(|d| std::time::Instant::now() + d);
        let mut signal = self.signal.lock();
        loop {
            if signal.interrupted {
                return self.exit_code;
            }
            match deadline {
                Some(deadline) => {
                    let now = std::time::Instant::now();
                    if now >= deadline {
                        return self.exit_code;
                    }
                    self.cond.wait_for(&mut signal, deadline - now);
                }
                None => {
                    self.cond.wait(&mut signal);
                }
            }
        }
    }

    fn kill(&self) -> Result<()> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.interrupt();
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.supports_stop {
            return Err(Error::Unsupported("stop"));
        }
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.interrupt();
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        if !self.supports_pause {
            return Err(Error::Unsupported("pause"));
        }
        self.signal.lock().paused = true;
        Ok(())
    }

    fn unpause(&self) -> Result<()> {
        if !self.supports_pause {
            return Err(Error::Unsupported("unpause"));
        }
        self.signal.lock().paused = false;
        Ok(())
    }
}

/// A minimal valid wasm module exporting `_start` that returns immediately.
///
/// Hand-assembled so tests need no toolchain: type, function, export, and
/// code sections around an empty body.
pub fn hello_wasm() -> &'static [u8] {
    &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // magic + version
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type: () -> ()
        0x03, 0x02, 0x01, 0x00, // func 0 uses type 0
        0x07, 0x0a, 0x01, 0x06, 0x5f, 0x73, 0x74, 0x61, 0x72, 0x74, 0x00, 0x00, // export "_start"
        0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // body: end
    ]
}

/// A wasm module whose `_start` loops forever; only an engine interrupt
/// (epoch kill) makes it return.
pub fn spin_wasm() -> &'static [u8] {
    &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // magic + version
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type: () -> ()
        0x03, 0x02, 0x01, 0x00, // func 0 uses type 0
        0x07, 0x0a, 0x01, 0x06, 0x5f, 0x73, 0x74, 0x61, 0x72, 0x74, 0x00, 0x00, // export "_start"
        0x0a, 0x09, 0x01, 0x07, 0x00, 0x03, 0x40, 0x0c, 0x00, 0x0b, 0x0b, // body: loop br 0
    ]
}

#[cfg(test)]
#[path = "test_support_tests.rs"]
mod tests;
