// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Host resource managers.
//!
//! Every resource handed to a sandbox is tagged with the owning module;
//! cleanup is driven by module lifetime, not container lifetime.

pub mod gpio;
pub mod messaging;
pub mod sensors;
pub mod timers;
