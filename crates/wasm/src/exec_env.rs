// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Execution environment handed to the event hub for a wasm sandbox.
//!
//! All guest access is forwarded over a channel to the worker thread that
//! owns the store. `copy_in` is the only round-trip; it carries a bounded
//! wait so a publisher can never hang on a sandbox that is busy in guest
//! code and not draining its pump.

use crate::pump::PumpMsg;
use ocre_core::{DispatchCall, Error, Result};
use ocre_events::ExecEnv;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::time::Duration;

/// How long a copy-in waits for the sandbox to service the request.
const COPY_IN_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) struct WasmExecEnv {
    tx: Mutex<mpsc::Sender<PumpMsg>>,
}

impl WasmExecEnv {
    pub(crate) fn new(tx: mpsc::Sender<PumpMsg>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl ExecEnv for WasmExecEnv {
    fn dispatch(&self, function: &str, call: DispatchCall) -> Result<()> {
        self.tx
            .lock()
            .send(PumpMsg::Dispatch { function: function.to_string(), call })
            .map_err(|_| Error::engine("sandbox is gone"))
    }

    fn copy_in(&self, bytes: &[u8]) -> Result<u32> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.tx
            .lock()
            .send(PumpMsg::CopyIn { bytes: bytes.to_vec(), reply: reply_tx })
            .map_err(|_| Error::engine("sandbox is gone"))?;

        match reply_rx.recv_timeout(COPY_IN_TIMEOUT) {
            Ok(result) => result,
            Err(_) => Err(Error::engine("sandbox did not service copy-in")),
        }
    }

    fn free(&self, offset: u32) {
        let _ = self.tx.lock().send(PumpMsg::Free { offset });
    }
}
