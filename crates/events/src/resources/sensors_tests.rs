// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;
use crate::testing::FakeExecEnv;
use ocre_core::SystemClock;

struct Fixture {
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
    sensors: Arc<SensorService>,
    module: ModuleId,
}

impl Fixture {
    fn new() -> Self {
        let queue = Arc::new(EventQueue::new(64));
        let registry = Arc::new(Registry::new());
        let sensors = SensorService::start(
            vec![Arc::new(RngSensorBackend::new(1, 42))],
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::new(SystemClock),
        );
        let module = registry.register(Arc::new(FakeExecEnv::new()));
        Self { queue, registry, sensors, module }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.sensors.shutdown();
    }
}

#[test]
fn discover_lists_backends() {
    let fixture = Fixture::new();
    let found = fixture.sensors.discover();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 1);
    assert_eq!(found[0].name, "rng");
    assert_eq!(found[0].channels, vec![0]);
}

#[test]
fn read_requires_open() {
    let fixture = Fixture::new();
    assert!(fixture.sensors.read(fixture.module, 1, 0).is_err());

    fixture.sensors.open_channel(fixture.module, 1).unwrap();
    fixture.sensors.read(fixture.module, 1, 0).unwrap();
}

#[test]
fn open_unknown_sensor_fails() {
    let fixture = Fixture::new();
    let err = fixture.sensors.open_channel(fixture.module, 9).unwrap_err();
    assert_eq!(err.kind(), "not-found");
}

#[test]
fn rng_produces_varying_non_negative_samples() {
    let fixture = Fixture::new();
    fixture.sensors.open_channel(fixture.module, 1).unwrap();
    let a = fixture.sensors.read(fixture.module, 1, 0).unwrap();
    let b = fixture.sensors.read(fixture.module, 1, 0).unwrap();
    assert!(a >= 0 && b >= 0);
    assert_ne!(a, b);
}

#[test]
fn subscription_publishes_samples() {
    let fixture = Fixture::new();
    fixture.sensors.open_channel(fixture.module, 1).unwrap();
    let sub = fixture.sensors.subscribe(fixture.module, 1, 0, 20).unwrap();

    std::thread::sleep(Duration::from_millis(150));
    let mut seen = 0;
    while let Some(event) = fixture.queue.try_pop_owned(fixture.module) {
        match event {
            Event::Sensor { sensor_id, channel, .. } => {
                assert_eq!(sensor_id, 1);
                assert_eq!(channel, 0);
                seen += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(seen >= 3, "expected several samples, got {seen}");

    fixture.sensors.unsubscribe(fixture.module, sub).unwrap();
    // Drain anything that was in flight at unsubscribe time.
    std::thread::sleep(Duration::from_millis(40));
    while fixture.queue.try_pop_owned(fixture.module).is_some() {}
    std::thread::sleep(Duration::from_millis(80));
    assert!(fixture.queue.try_pop_owned(fixture.module).is_none());
}

#[test]
fn subscribe_requires_open_and_valid_channel() {
    let fixture = Fixture::new();
    assert!(fixture.sensors.subscribe(fixture.module, 1, 0, 10).is_err());

    fixture.sensors.open_channel(fixture.module, 1).unwrap();
    assert!(fixture.sensors.subscribe(fixture.module, 1, 5, 10).is_err());
    assert!(fixture.sensors.subscribe(fixture.module, 1, 0, 0).is_err());
}

#[test]
fn opens_and_subscriptions_are_counted() {
    let fixture = Fixture::new();
    fixture.sensors.open_channel(fixture.module, 1).unwrap();
    assert_eq!(fixture.registry.resource_count(fixture.module, ResourceKind::Sensor), 1);

    let sub = fixture.sensors.subscribe(fixture.module, 1, 0, 1000).unwrap();
    assert_eq!(fixture.registry.resource_count(fixture.module, ResourceKind::Sensor), 2);

    fixture.sensors.unsubscribe(fixture.module, sub).unwrap();
    assert_eq!(fixture.registry.resource_count(fixture.module, ResourceKind::Sensor), 1);
}

#[test]
fn cleanup_releases_everything() {
    let fixture = Fixture::new();
    fixture.sensors.open_channel(fixture.module, 1).unwrap();
    fixture.sensors.subscribe(fixture.module, 1, 0, 1000).unwrap();

    fixture.sensors.cleanup(fixture.module);
    assert_eq!(fixture.registry.resource_count(fixture.module, ResourceKind::Sensor), 0);

    // Sensor can be opened again afterwards.
    fixture.sensors.open_channel(fixture.module, 1).unwrap();
}
