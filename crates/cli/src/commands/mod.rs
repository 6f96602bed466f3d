// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

pub mod container;
pub mod daemon;
pub mod image;
