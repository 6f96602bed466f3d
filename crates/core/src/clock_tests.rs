// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;

#[test]
fn system_clock_advances() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_is_controllable() {
    let clock = FakeClock::new();
    let start = clock.now();
    let epoch = clock.epoch_ms();
    clock.advance(Duration::from_millis(250));
    assert_eq!(clock.now() - start, Duration::from_millis(250));
    assert_eq!(clock.epoch_ms() - epoch, 250);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(clock.now(), other.now());
}
