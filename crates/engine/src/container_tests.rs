// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;
use ocre_core::FakeEngine;
use std::path::PathBuf;
use std::time::Duration;

fn spec(image: &str) -> InstanceSpec {
    InstanceSpec {
        image_path: PathBuf::from(format!("/tmp/ocre/images/{image}")),
        argv: vec![format!("/tmp/ocre/images/{image}")],
        ..Default::default()
    }
}

fn as_engine(engine: FakeEngine) -> Arc<dyn RuntimeEngine> {
    Arc::new(engine)
}

#[test]
fn create_strips_image_to_basename() {
    let engine = as_engine(FakeEngine::new("fake"));
    let container = Container::create("c1", true, &engine, spec("hello.wasm")).unwrap();
    assert_eq!(container.id(), "c1");
    assert_eq!(container.image(), "hello.wasm");
    assert_eq!(container.runtime_name(), "fake");
    assert_eq!(container.status(), ContainerStatus::Created);
}

#[test]
fn create_propagates_engine_failure() {
    let engine = as_engine(FakeEngine::new("fake").failing_create("no memory"));
    let err = Container::create("c1", true, &engine, spec("hello.wasm")).unwrap_err();
    assert_eq!(err.kind(), "engine");
}

#[test]
fn non_detached_start_blocks_until_exit() {
    let engine = as_engine(FakeEngine::new("fake"));
    let container = Container::create("c1", false, &engine, spec("hello.wasm")).unwrap();

    container.start().unwrap();
    assert_eq!(container.status(), ContainerStatus::Stopped);
    assert_eq!(container.wait().unwrap(), 0);
    assert_eq!(container.exit_code(), Some(0));
}

#[test]
fn detached_start_returns_while_running() {
    let engine = as_engine(FakeEngine::long_running("fake"));
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();

    container.start().unwrap();
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    assert_eq!(container.wait().unwrap(), 0);
    assert_eq!(container.status(), ContainerStatus::Stopped);
}

#[test]
fn start_rejects_wrong_states() {
    let engine = as_engine(FakeEngine::long_running("fake"));
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
    container.start().unwrap();

    let err = container.start().unwrap_err();
    assert!(matches!(
        err,
        Error::WrongState { op: "start", status: ContainerStatus::Running }
    ));

    container.kill().unwrap();
    container.wait().unwrap();
}

#[test]
fn restart_after_stop_reexecutes_the_instance() {
    let engine = Arc::new(FakeEngine::new("fake").with_exit_code(7));
    let dyn_engine: Arc<dyn RuntimeEngine> = Arc::clone(&engine) as _;
    let container = Container::create("c1", false, &dyn_engine, spec("hello.wasm")).unwrap();

    container.start().unwrap();
    assert_eq!(container.wait().unwrap(), 7);

    // Second start from Stopped reruns the same engine instance.
    container.start().unwrap();
    assert_eq!(container.wait().unwrap(), 7);
    assert_eq!(container.status(), ContainerStatus::Stopped);
    assert_eq!(engine.instances()[0].execute_calls(), 2);
}

#[test]
fn wait_before_start_fails() {
    let engine = as_engine(FakeEngine::new("fake"));
    let container = Container::create("c1", true, &engine, spec("hello.wasm")).unwrap();
    let err = container.wait().unwrap_err();
    assert!(matches!(
        err,
        Error::WrongState { op: "wait", status: ContainerStatus::Created }
    ));
}

#[test]
fn kill_requires_live_container() {
    let engine = as_engine(FakeEngine::new("fake"));
    let container = Container::create("c1", true, &engine, spec("hello.wasm")).unwrap();
    assert!(container.kill().is_err());

    container.start().unwrap();
    container.wait().unwrap();
    let err = container.kill().unwrap_err();
    assert!(matches!(
        err,
        Error::WrongState { op: "kill", status: ContainerStatus::Stopped }
    ));
}

#[test]
fn stop_unsupported_leaves_container_running() {
    let engine = as_engine(FakeEngine::long_running("fake"));
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
    container.start().unwrap();

    let err = container.stop().unwrap_err();
    assert!(matches!(err, Error::Unsupported("stop")));
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    container.wait().unwrap();
}

#[test]
fn stop_supported_makes_worker_return() {
    let engine = as_engine(FakeEngine::long_running("fake").with_stop());
    let container = Container::create("c1", true, &engine, spec("svc.wasm")).unwrap();
    container.start().unwrap();

    container.stop().unwrap();
    assert_eq!(container.wait().unwrap(), 0);
}

#[test]
fn pause_unsupported_keeps_running() {
    let engine = as_engine(FakeEngine::long_running("fake"));
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
    container.start().unwrap();

    let err = container.pause().unwrap_err();
    assert!(matches!(err, Error::Unsupported("pause")));
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    container.wait().unwrap();
}

#[test]
fn pause_and_unpause_round_trip() {
    let engine = as_engine(FakeEngine::long_running("fake").with_pause());
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
    container.start().unwrap();

    container.pause().unwrap();
    assert_eq!(container.status(), ContainerStatus::Paused);

    // Pausing twice is a state error.
    assert!(container.pause().is_err());

    container.unpause().unwrap();
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    container.wait().unwrap();
}

#[test]
fn kill_while_paused_is_accepted() {
    let engine = as_engine(FakeEngine::long_running("fake").with_pause());
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
    container.start().unwrap();
    container.pause().unwrap();

    container.kill().unwrap();
    assert_eq!(container.wait().unwrap(), 0);
    assert_eq!(container.status(), ContainerStatus::Stopped);
}

#[test]
fn concurrent_waiters_all_get_the_exit_code() {
    let engine = as_engine(FakeEngine::long_running("fake").with_exit_code(3));
    let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
    container.start().unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let container = Arc::clone(&container);
            std::thread::spawn(move || container.wait())
        })
        .collect();

    std::thread::sleep(Duration::from_millis(30));
    container.kill().unwrap();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().unwrap(), 3);
    }
}

/// Racing status, wait, and kill must neither deadlock nor double-join.
#[test]
fn stress_racing_observers_resolve_exactly_once() {
    for _ in 0..20 {
        let engine = as_engine(FakeEngine::long_running("fake"));
        let container = Container::create("c1", true, &engine, spec("blinky.wasm")).unwrap();
        container.start().unwrap();

        let mut threads = Vec::new();
        for _ in 0..3 {
            let container = Arc::clone(&container);
            threads.push(std::thread::spawn(move || {
                let _ = container.wait();
            }));
        }
        for _ in 0..3 {
            let container = Arc::clone(&container);
            threads.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    let _ = container.status();
                }
            }));
        }
        {
            let container = Arc::clone(&container);
            threads.push(std::thread::spawn(move || {
                let _ = container.kill();
            }));
        }

        // Whatever the interleaving, the container settles in Stopped and
        // no observer ever sees Exited.
        for thread in threads {
            thread.join().unwrap();
        }
        let _ = container.kill();
        container.wait().unwrap();
        assert_eq!(container.status(), ContainerStatus::Stopped);
    }
}

#[test]
fn status_never_reports_exited() {
    let engine = as_engine(FakeEngine::new("fake").with_run_for(Duration::from_millis(10)));
    let container = Container::create("c1", true, &engine, spec("hello.wasm")).unwrap();
    container.start().unwrap();

    loop {
        let status = container.status();
        assert_ne!(status, ContainerStatus::Exited);
        if status == ContainerStatus::Stopped {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
