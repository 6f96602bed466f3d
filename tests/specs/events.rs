// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Event subsystem scenarios: timer round-trips, pub/sub fan-out, resource
//! reclamation.

use ocre_core::{DispatchCall, Event, ModuleId, ResourceKind};
use ocre_events::{EventHub, FakeExecEnv, HubConfig, PinDirection, PinState};
use std::sync::Arc;
use std::time::Duration;

fn hub() -> Arc<EventHub> {
    EventHub::start(HubConfig::default())
}

fn module(hub: &EventHub) -> (ModuleId, Arc<FakeExecEnv>) {
    let env = Arc::new(FakeExecEnv::new());
    let id = hub.register_module(Arc::clone(&env) as _);
    (id, env)
}

/// A periodic 50 ms timer delivers at least 5 callbacks within 400 ms and
/// stops after delete.
#[test]
fn timer_round_trip() {
    let hub = hub();
    let (module, env) = module(&hub);
    hub.registry()
        .register_dispatcher(module, ResourceKind::Timer, "on_timer")
        .unwrap();

    hub.timers().create(module, 3).unwrap();
    hub.timers().start_timer(module, 3, 50, true).unwrap();

    assert!(env.wait_for_calls(5, Duration::from_millis(900)));
    for (function, call) in env.calls() {
        assert_eq!(function, "on_timer");
        assert_eq!(call, DispatchCall::Timer { timer_id: 3 });
    }

    hub.timers().delete(module, 3).unwrap();
    let after_delete = env.call_count();
    std::thread::sleep(Duration::from_millis(200));
    // One expiry may have been in flight at delete time; none arrive after.
    assert!(env.call_count() <= after_delete + 1);

    hub.shutdown();
}

/// One publish, two subscribers: each gets exactly one callback with its own
/// copy of the payload and a distinct message ID.
#[test]
fn pub_sub_fan_out() {
    let hub = hub();
    let (a, env_a) = module(&hub);
    let (b, env_b) = module(&hub);

    hub.messaging().subscribe(a, "t", "on_message").unwrap();
    hub.messaging().subscribe(b, "t", "on_message").unwrap();

    assert_eq!(hub.messaging().publish("t", "application/json", b"{\"k\":1}").unwrap(), 2);

    let mut ids = Vec::new();
    for env in [&env_a, &env_b] {
        assert!(env.wait_for_calls(1, Duration::from_secs(2)));
        let calls = env.calls();
        assert_eq!(calls.len(), 1);
        match calls[0].1 {
            DispatchCall::Message { message_id, payload, payload_len, .. } => {
                assert_eq!(payload_len as usize, b"{\"k\":1}".len());
                assert_eq!(env.guest_bytes(payload).unwrap(), b"{\"k\":1}");
                ids.push(message_id);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }
    assert_ne!(ids[0], ids[1]);

    hub.shutdown();
}

/// Events enqueued by one producer reach the callback in order.
#[test]
fn per_producer_fifo() {
    let hub = hub();
    let (module, env) = module(&hub);
    hub.registry()
        .register_dispatcher(module, ResourceKind::Gpio, "on_gpio")
        .unwrap();

    for pin in 1..=5u32 {
        hub.queue()
            .publish(Event::Gpio { pin, port: 0, state: pin % 2, owner: module })
            .unwrap();
    }

    assert!(env.wait_for_calls(5, Duration::from_secs(2)));
    let pins: Vec<u32> = env
        .calls()
        .iter()
        .map(|(_, call)| match call {
            DispatchCall::Gpio { pin, .. } => *pin,
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(pins, vec![1, 2, 3, 4, 5]);

    hub.shutdown();
}

/// After a module with timers, GPIO callbacks, and subscriptions goes away,
/// the registry reports zero outstanding resources.
#[test]
fn module_teardown_leaks_nothing() {
    let hub = hub();
    let (module, _env) = module(&hub);

    for id in 1..=3 {
        hub.timers().create(module, id).unwrap();
    }
    for pin in 0..2 {
        hub.gpio().configure(0, pin, PinDirection::Input).unwrap();
        hub.gpio().register_callback(module, 0, pin).unwrap();
    }
    hub.sensors().open_channel(module, 1).unwrap();
    hub.sensors().subscribe(module, 1, 0, 500).unwrap();
    hub.messaging().subscribe(module, "t", "on_message").unwrap();
    hub.messaging().subscribe(module, "u", "on_message").unwrap();

    hub.unregister_module(module);

    for kind in ResourceKind::ALL {
        assert_eq!(hub.registry().resource_count(module, kind), 0, "{kind} leaked");
    }

    // The freed slots are usable by a new module.
    let (next, _env) = self::module(&hub);
    hub.timers().create(next, 1).unwrap();
    hub.gpio().register_callback(next, 0, 0).unwrap();

    hub.shutdown();
}

/// A GPIO edge lands in the owning module's callback with the new level.
#[test]
fn gpio_edge_reaches_callback() {
    let hub = hub();
    let (module, env) = module(&hub);
    hub.registry()
        .register_dispatcher(module, ResourceKind::Gpio, "on_gpio")
        .unwrap();

    hub.gpio().configure(1, 4, PinDirection::Input).unwrap();
    hub.gpio().register_callback(module, 1, 4).unwrap();
    hub.gpio().edge(1, 4, PinState::Set);

    assert!(env.wait_for_calls(1, Duration::from_secs(2)));
    assert_eq!(env.calls()[0].1, DispatchCall::Gpio { pin: 4, state: 1 });

    hub.shutdown();
}

/// Sensor subscriptions sample periodically into the callback.
#[test]
fn sensor_subscription_streams_samples() {
    let hub = hub();
    let (module, env) = module(&hub);
    hub.registry()
        .register_dispatcher(module, ResourceKind::Sensor, "on_sensor")
        .unwrap();

    hub.sensors().open_channel(module, 1).unwrap();
    hub.sensors().subscribe(module, 1, 0, 30).unwrap();

    assert!(env.wait_for_calls(3, Duration::from_secs(2)));
    for (function, call) in env.calls() {
        assert_eq!(function, "on_sensor");
        match call {
            DispatchCall::Sensor { sensor_id, channel, .. } => {
                assert_eq!(sensor_id, 1);
                assert_eq!(channel, 0);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    hub.shutdown();
}
