// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ocre-wasm: the default WebAssembly runtime engine.
//!
//! Each container gets its own wasmtime engine with epoch interruption, so
//! `kill` is a prompt trap isolated to that sandbox. The module is compiled
//! once at create time and re-instantiated per run, which makes restart
//! cheap and keeps the image usable across runs.
//!
//! Guest code reaches the host through the `ocre` import module: timers,
//! GPIO, sensors, messaging, dispatcher registration, and an event pull
//! primitive. After the guest's `_start` returns, modules that registered
//! dispatchers stay alive in an event pump on the worker thread; dispatcher
//! threads hand calls to that pump because a wasmtime store can only be
//! driven from one thread.

mod engine;
mod exec_env;
mod host;
mod pump;

pub use engine::{WasmEngine, RUNTIME_NAME};
