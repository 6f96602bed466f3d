// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Messages handed from dispatcher/publisher threads to the sandbox's worker
//! thread, which owns the wasmtime store.

use ocre_core::{DispatchCall, Result};
use std::sync::mpsc;

pub(crate) enum PumpMsg {
    /// Invoke a guest dispatcher function.
    Dispatch { function: String, call: DispatchCall },
    /// Duplicate bytes into guest memory; reply with the guest offset.
    CopyIn { bytes: Vec<u8>, reply: mpsc::SyncSender<Result<u32>> },
    /// Release a guest buffer produced by `CopyIn`.
    Free { offset: u32 },
    /// Leave the pump loop.
    Shutdown,
}
