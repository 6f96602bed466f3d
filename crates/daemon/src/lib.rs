// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ocre-daemon: the `ocred` supervisor.
//!
//! Exposes the context/container API over a local unix socket speaking the
//! CBOR wire protocol.

pub mod env;
pub mod listener;
pub mod pidfile;
