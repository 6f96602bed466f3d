// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;

#[test]
fn immediate_instance_exits_with_configured_code() {
    let engine = FakeEngine::new("fake").with_exit_code(3);
    let instance = engine.create(&InstanceSpec::default()).unwrap();
    let gate = StartGate::new();
    assert_eq!(instance.execute(&gate), 3);
    gate.wait();
}

#[test]
fn long_running_instance_returns_on_kill() {
    let engine = FakeEngine::long_running("fake");
    let instance = engine.create(&InstanceSpec::default()).unwrap();
    let gate = Arc::new(StartGate::new());

    let worker = {
        let instance = Arc::clone(engine.instances().first().unwrap());
        let gate = Arc::clone(&gate);
        std::thread::spawn(move || instance.execute(&gate))
    };

    gate.wait();
    instance.kill().unwrap();
    assert_eq!(worker.join().unwrap(), 0);
    assert_eq!(engine.instances()[0].kill_calls(), 1);
}

#[test]
fn instance_is_restartable() {
    let engine = FakeEngine::new("fake");
    let instance = engine.create(&InstanceSpec::default()).unwrap();
    for _ in 0..2 {
        let gate = StartGate::new();
        assert_eq!(instance.execute(&gate), 0);
    }
    assert_eq!(engine.instances()[0].execute_calls(), 2);
}

#[test]
fn pause_requires_capability() {
    let engine = FakeEngine::long_running("bare");
    let instance = engine.create(&InstanceSpec::default()).unwrap();
    assert!(matches!(instance.pause(), Err(Error::Unsupported("pause"))));

    let engine = FakeEngine::long_running("pausable").with_pause();
    let instance = engine.create(&InstanceSpec::default()).unwrap();
    instance.pause().unwrap();
    instance.unpause().unwrap();
}

#[test]
fn wasm_fixtures_have_magic() {
    assert_eq!(&hello_wasm()[..4], b"\0asm");
    assert_eq!(&spin_wasm()[..4], b"\0asm");
}
