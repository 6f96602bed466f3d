// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ocre-engine: the container lifecycle and supervision core.
//!
//! A caller goes library -> context -> container. The library owns the
//! runtime-engine registry and the set of contexts; a context owns a working
//! directory and its containers; a container owns one runtime instance, one
//! worker thread, and the synchronization that keeps its state canonical
//! against concurrent operators.

pub mod container;
pub mod context;
pub mod library;
pub mod workdir;

pub use container::{Container, ContainerArgs};
pub use context::{Context, CreateRequest};
pub use library::{Ocre, OcreConfig};

pub use ocre_core::{is_valid_name, ContainerStatus, Error, Result};
