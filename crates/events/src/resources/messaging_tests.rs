// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;
use crate::testing::FakeExecEnv;

struct Fixture {
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
    messaging: Arc<MessagingService>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_capacity(64)
    }

    fn with_capacity(capacity: usize) -> Self {
        let queue = Arc::new(EventQueue::new(capacity));
        let registry = Arc::new(Registry::new());
        let messaging = MessagingService::new(Arc::clone(&queue), Arc::clone(&registry));
        Self { queue, registry, messaging }
    }

    fn module(&self) -> (ModuleId, Arc<FakeExecEnv>) {
        let env = Arc::new(FakeExecEnv::new());
        let module = self.registry.register(Arc::clone(&env) as _);
        (module, env)
    }
}

#[test]
fn publish_fans_out_to_each_subscriber() {
    let fixture = Fixture::new();
    let (a, env_a) = fixture.module();
    let (b, env_b) = fixture.module();
    let (c, _env_c) = fixture.module();

    fixture.messaging.subscribe(a, "t", "on_message").unwrap();
    fixture.messaging.subscribe(b, "t", "on_message").unwrap();
    fixture.messaging.subscribe(c, "other", "on_message").unwrap();

    let delivered = fixture.messaging.publish("t", "text/plain", b"hello").unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(fixture.queue.len(), 2);

    let mut ids = Vec::new();
    for (module, env) in [(a, &env_a), (b, &env_b)] {
        let event = fixture.queue.try_pop_owned(module).unwrap();
        match event {
            Event::Message { message_id, topic, content_type, payload, payload_len, owner } => {
                assert_eq!(owner, module);
                assert_eq!(payload_len, 5);
                // Buffers were duplicated into this subscriber's memory
                // before the event was enqueued.
                assert_eq!(env.guest_bytes(topic).unwrap(), b"t\0");
                assert_eq!(env.guest_bytes(content_type).unwrap(), b"text/plain\0");
                assert_eq!(env.guest_bytes(payload).unwrap(), b"hello");
                ids.push(message_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    // Distinct, monotonically assigned message IDs.
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn publish_without_subscribers_delivers_nothing() {
    let fixture = Fixture::new();
    assert_eq!(fixture.messaging.publish("t", "text/plain", b"x").unwrap(), 0);
    assert!(fixture.queue.is_empty());
}

#[test]
fn publish_validates_arguments() {
    let fixture = Fixture::new();
    assert!(fixture.messaging.publish("", "ct", b"x").is_err());
    assert!(fixture.messaging.publish("t", "", b"x").is_err());
    assert!(fixture.messaging.publish("t", "ct", b"").is_err());
    assert!(fixture
        .messaging
        .publish("t", "ct", &vec![0u8; MAX_PAYLOAD + 1])
        .is_err());
}

#[test]
fn subscribe_registers_messaging_dispatcher() {
    let fixture = Fixture::new();
    let (module, _env) = fixture.module();
    fixture.messaging.subscribe(module, "t", "handle_msg").unwrap();

    match fixture.registry.dispatch_target(module, ResourceKind::Messaging) {
        crate::registry::DispatchTarget::Call { function, .. } => {
            assert_eq!(function, "handle_msg")
        }
        _ => panic!("expected messaging dispatcher"),
    }
}

#[test]
fn duplicate_subscription_is_a_conflict() {
    let fixture = Fixture::new();
    let (module, _env) = fixture.module();
    fixture.messaging.subscribe(module, "t", "on_message").unwrap();
    let err = fixture.messaging.subscribe(module, "t", "on_message").unwrap_err();
    assert_eq!(err.kind(), "conflict");
}

#[test]
fn subscription_slots_are_bounded() {
    let fixture = Fixture::new();
    let (module, _env) = fixture.module();
    for i in 0..MAX_SUBSCRIPTIONS {
        fixture.messaging.subscribe(module, &format!("t{i}"), "on_message").unwrap();
    }
    let err = fixture.messaging.subscribe(module, "overflow", "on_message").unwrap_err();
    assert_eq!(err.kind(), "resource-exhausted");
}

#[test]
fn queue_overflow_frees_guest_buffers() {
    let fixture = Fixture::with_capacity(1);
    let (a, env_a) = fixture.module();
    let (b, env_b) = fixture.module();
    fixture.messaging.subscribe(a, "t", "on_message").unwrap();
    fixture.messaging.subscribe(b, "t", "on_message").unwrap();

    // Queue holds one event; the second subscriber's delivery fails and its
    // buffers must be released.
    let delivered = fixture.messaging.publish("t", "ct", b"x").unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(env_a.outstanding_buffers(), 3);
    assert_eq!(env_b.outstanding_buffers(), 0);
}

#[test]
fn message_ids_are_monotonic_across_publishes() {
    let fixture = Fixture::new();
    let (module, _env) = fixture.module();
    fixture.messaging.subscribe(module, "t", "on_message").unwrap();

    fixture.messaging.publish("t", "ct", b"one").unwrap();
    fixture.messaging.publish("t", "ct", b"two").unwrap();

    let first = fixture.queue.try_pop_owned(module).unwrap();
    let second = fixture.queue.try_pop_owned(module).unwrap();
    match (first, second) {
        (Event::Message { message_id: a, .. }, Event::Message { message_id: b, .. }) => {
            assert!(b > a)
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
fn cleanup_removes_module_subscriptions() {
    let fixture = Fixture::new();
    let (a, _env_a) = fixture.module();
    let (b, _env_b) = fixture.module();
    fixture.messaging.subscribe(a, "t", "on_message").unwrap();
    fixture.messaging.subscribe(a, "u", "on_message").unwrap();
    fixture.messaging.subscribe(b, "t", "on_message").unwrap();

    fixture.messaging.cleanup(a);
    assert_eq!(fixture.registry.resource_count(a, ResourceKind::Messaging), 0);
    assert_eq!(fixture.registry.resource_count(b, ResourceKind::Messaging), 1);
    assert_eq!(fixture.messaging.publish("t", "ct", b"x").unwrap(), 1);
}
