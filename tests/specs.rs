// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Workspace-level integration specs.

// Allow panic!/unwrap/expect in test code
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod specs {
    mod cli;
    mod events;
    mod lifecycle;
}
