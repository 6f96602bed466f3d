// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;
use crate::testing::FakeExecEnv;
use ocre_core::FakeClock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn registry() -> Registry {
    Registry::new()
}

#[test]
fn register_allocates_distinct_ids() {
    let registry = registry();
    let a = registry.register(Arc::new(FakeExecEnv::new()));
    let b = registry.register(Arc::new(FakeExecEnv::new()));
    assert_ne!(a, b);
    assert_eq!(registry.module_count(), 2);
}

#[test]
fn dispatcher_registration_and_lookup() {
    let registry = registry();
    let module = registry.register(Arc::new(FakeExecEnv::new()));

    assert!(matches!(
        registry.dispatch_target(module, ResourceKind::Timer),
        DispatchTarget::NoDispatcher
    ));

    registry
        .register_dispatcher(module, ResourceKind::Timer, "on_timer")
        .unwrap();
    match registry.dispatch_target(module, ResourceKind::Timer) {
        DispatchTarget::Call { function, .. } => assert_eq!(function, "on_timer"),
        _ => panic!("expected dispatch target"),
    }

    assert!(matches!(
        registry.dispatch_target(ModuleId(999), ResourceKind::Timer),
        DispatchTarget::UnknownModule
    ));
}

#[test]
fn dispatcher_registration_rejects_unknown_module() {
    let registry = registry();
    let err = registry
        .register_dispatcher(ModuleId(42), ResourceKind::Gpio, "on_gpio")
        .unwrap_err();
    assert_eq!(err.kind(), "not-found");
}

#[test]
fn resource_counters_saturate_at_zero() {
    let registry = registry();
    let module = registry.register(Arc::new(FakeExecEnv::new()));

    registry.increment_resource_count(module, ResourceKind::Gpio);
    registry.increment_resource_count(module, ResourceKind::Gpio);
    assert_eq!(registry.resource_count(module, ResourceKind::Gpio), 2);

    registry.decrement_resource_count(module, ResourceKind::Gpio);
    registry.decrement_resource_count(module, ResourceKind::Gpio);
    registry.decrement_resource_count(module, ResourceKind::Gpio);
    assert_eq!(registry.resource_count(module, ResourceKind::Gpio), 0);
}

#[test]
fn unregister_runs_cleanup_handlers_while_module_is_live() {
    let registry = Arc::new(registry());
    let module = registry.register(Arc::new(FakeExecEnv::new()));
    registry.increment_resource_count(module, ResourceKind::Timer);

    let ran = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&registry);
    let counter = Arc::clone(&ran);
    registry.set_cleanup_handler(
        ResourceKind::Timer,
        Box::new(move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            // The module must still be visible so counters can be fixed up.
            if let Some(registry) = weak.upgrade() {
                registry.decrement_resource_count(m, ResourceKind::Timer);
            }
        }),
    );

    registry.unregister(module);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(!registry.is_registered(module));
}

#[test]
fn touch_updates_last_activity() {
    let clock = FakeClock::new();
    let registry = Registry::with_clock(Arc::new(clock.clone()));
    let module = registry.register(Arc::new(FakeExecEnv::new()));
    let initial = registry.last_activity(module).unwrap();

    clock.advance(Duration::from_millis(500));
    registry.touch(module);
    assert_eq!(registry.last_activity(module).unwrap(), initial + 500);
}
