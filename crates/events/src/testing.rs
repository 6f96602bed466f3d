// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Test double for a sandbox execution environment.

#![allow(clippy::unwrap_used)]

use crate::registry::ExecEnv;
use ocre_core::{DispatchCall, Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Records dispatched calls and models guest memory as a slab of buffers.
pub struct FakeExecEnv {
    calls: Mutex<Vec<(String, DispatchCall)>>,
    call_arrived: Condvar,
    memory: Mutex<GuestMemory>,
    fail_dispatch: bool,
}

#[derive(Default)]
struct GuestMemory {
    buffers: HashMap<u32, Vec<u8>>,
    next_offset: u32,
}

impl FakeExecEnv {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            call_arrived: Condvar::new(),
            memory: Mutex::new(GuestMemory { buffers: HashMap::new(), next_offset: 0x1000 }),
            fail_dispatch: false,
        }
    }

    /// Every dispatch fails, as if the sandbox had been torn down.
    pub fn failing() -> Self {
        Self { fail_dispatch: true, ..Self::new() }
    }

    pub fn calls(&self) -> Vec<(String, DispatchCall)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Block until at least `count` calls arrived; false on timeout.
    pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut calls = self.calls.lock();
        while calls.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.call_arrived.wait_for(&mut calls, deadline - now);
        }
        true
    }

    /// Bytes previously copied in at `offset`.
    pub fn guest_bytes(&self, offset: u32) -> Option<Vec<u8>> {
        self.memory.lock().buffers.get(&offset).cloned()
    }

    /// Number of copy-in buffers not yet freed.
    pub fn outstanding_buffers(&self) -> usize {
        self.memory.lock().buffers.len()
    }
}

impl Default for FakeExecEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecEnv for FakeExecEnv {
    fn dispatch(&self, function: &str, call: DispatchCall) -> Result<()> {
        if self.fail_dispatch {
            return Err(Error::engine("sandbox gone"));
        }
        self.calls.lock().push((function.to_string(), call));
        self.call_arrived.notify_all();
        Ok(())
    }

    fn copy_in(&self, bytes: &[u8]) -> Result<u32> {
        let mut memory = self.memory.lock();
        let offset = memory.next_offset;
        memory.next_offset += (bytes.len() as u32).max(1);
        memory.buffers.insert(offset, bytes.to_vec());
        Ok(offset)
    }

    fn free(&self, offset: u32) {
        self.memory.lock().buffers.remove(&offset);
    }
}
