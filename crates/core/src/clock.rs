// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Clock abstraction for testable time handling

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time
///
/// Object-safe so it can be injected as `Arc<dyn Clock>` into the event
/// subsystem (registry activity stamps, timer wheel, sensor sampler).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Fake clock for testing with controllable time
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeClock {
    current: std::sync::Arc<parking_lot::Mutex<Instant>>,
    epoch_ms: std::sync::Arc<parking_lot::Mutex<u64>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: std::sync::Arc::new(parking_lot::Mutex::new(Instant::now())),
            epoch_ms: std::sync::Arc::new(parking_lot::Mutex::new(1_000_000)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
