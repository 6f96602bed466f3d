// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! End-to-end lifecycle scenarios through the public library API.

use ocre_core::test_support::hello_wasm;
use ocre_core::{ContainerStatus, Error, FakeEngine, RuntimeEngine};
use ocre_engine::{ContainerArgs, Context, CreateRequest, Ocre, OcreConfig};
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;

const NATIVE_RUNTIME: &str = "test/native";

struct World {
    _dir: tempfile::TempDir,
    library: Option<Ocre>,
    context: Arc<Context>,
}

impl World {
    /// Library + context over a temp workdir, with a long-running native
    /// test engine registered next to the default wasm one.
    fn new(native: FakeEngine) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let library = Ocre::initialize(OcreConfig {
            extra_runtimes: vec![Arc::new(native)],
            default_workdir: Some(dir.path().join("default")),
            ..Default::default()
        })
        .unwrap();
        let context = library.create_context(Some(dir.path())).unwrap();
        std::fs::write(dir.path().join("images/hello.wasm"), hello_wasm()).unwrap();
        Self { _dir: dir, library: Some(library), context }
    }

    fn workdir(&self) -> &Path {
        self.context.workdir()
    }

    fn create(&self, request: CreateRequest) -> Arc<ocre_engine::Container> {
        self.context.create_container(request).unwrap()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if let Some(library) = self.library.take() {
            library.deinitialize();
        }
    }
}

fn hello_request(detached: bool) -> CreateRequest {
    CreateRequest {
        image: "hello.wasm".to_string(),
        runtime: Some("wamr/wasip1".to_string()),
        id: None,
        detached,
        args: ContainerArgs::default(),
    }
}

fn native_request(id: &str) -> CreateRequest {
    CreateRequest {
        image: "blinky.wasm".to_string(),
        runtime: Some(NATIVE_RUNTIME.to_string()),
        id: Some(id.to_string()),
        detached: true,
        args: ContainerArgs {
            capabilities: vec!["ocre:api".to_string()],
            ..Default::default()
        },
    }
}

/// Hello-world wait: start returns, the container is stopped, exit code 0.
#[test]
#[serial]
fn hello_world_runs_to_completion() {
    let world = World::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let container = world.create(hello_request(false));

    container.start().unwrap();
    assert_eq!(container.status(), ContainerStatus::Stopped);
    assert_eq!(container.wait().unwrap(), 0);
}

/// Restart: a stopped container starts again and stops again.
#[test]
#[serial]
fn stopped_container_restarts() {
    let world = World::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let container = world.create(hello_request(false));

    container.start().unwrap();
    assert_eq!(container.wait().unwrap(), 0);

    container.start().unwrap();
    assert_eq!(container.wait().unwrap(), 0);
    assert_eq!(container.status(), ContainerStatus::Stopped);
}

/// Kill a detached long-runner: wait succeeds and the final state is
/// stopped.
#[test]
#[serial]
fn killed_blinker_stops() {
    let world = World::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let container = world.create(native_request("blinker"));

    container.start().unwrap();
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    container.wait().unwrap();
    assert_eq!(container.status(), ContainerStatus::Stopped);
}

/// Duplicate explicit IDs are rejected and the first container survives.
#[test]
#[serial]
fn duplicate_container_id_is_rejected() {
    let world = World::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let _first = world.create(native_request("dup"));

    let err = world.context.create_container(native_request("dup")).unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let first = world.context.get_container_by_id("dup").unwrap();
    first.start().unwrap();
    first.kill().unwrap();
    first.wait().unwrap();
}

/// A running container cannot be removed.
#[test]
#[serial]
fn remove_rejects_running_container() {
    let world = World::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let container = world.create(native_request("runner"));
    container.start().unwrap();

    let err = world.context.remove_container(&container).unwrap_err();
    assert!(matches!(err, Error::WrongState { op: "remove", .. }));
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    container.wait().unwrap();
    world.context.remove_container(&container).unwrap();
}

/// Removal leaves nothing under the per-container workdir.
#[test]
#[serial]
fn remove_cleans_filesystem_workdir() {
    let world = World::new(FakeEngine::new(NATIVE_RUNTIME));
    let mut request = native_request("fsuser");
    request.args.capabilities.push("filesystem".to_string());
    let container = world.create(request);

    let container_dir = world.workdir().join("containers/fsuser");
    assert!(container_dir.is_dir());
    std::fs::write(container_dir.join("data"), b"x").unwrap();

    world.context.remove_container(&container).unwrap();
    assert!(!container_dir.exists());
}

/// An engine without pause yields Unsupported and the container keeps
/// running.
#[test]
#[serial]
fn pause_on_engine_without_pause_is_unsupported() {
    let world = World::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let container = world.create(native_request("nopause"));
    container.start().unwrap();

    let err = container.pause().unwrap_err();
    assert!(matches!(err, Error::Unsupported("pause")));
    assert_eq!(container.status(), ContainerStatus::Running);

    container.kill().unwrap();
    container.wait().unwrap();
}

/// Deinitialize destroys every context and engine, and the library can be
/// initialized again afterwards.
#[test]
#[serial]
fn deinitialize_is_complete() {
    let native = Arc::new(FakeEngine::long_running(NATIVE_RUNTIME));
    let dir = tempfile::tempdir().unwrap();
    let library = Ocre::initialize(OcreConfig {
        extra_runtimes: vec![Arc::clone(&native) as Arc<dyn RuntimeEngine>],
        default_workdir: Some(dir.path().join("default")),
        ..Default::default()
    })
    .unwrap();

    let context = library.create_context(Some(dir.path())).unwrap();
    let container = context
        .create_container(native_request("leftover"))
        .unwrap();
    container.start().unwrap();

    library.deinitialize();
    assert_eq!(native.deinit_calls(), 1);

    let library = Ocre::initialize(OcreConfig {
        default_workdir: Some(dir.path().join("default2")),
        ..Default::default()
    })
    .unwrap();
    library.deinitialize();
}

/// Echoed argv: the engine sees the image path first, then the caller's
/// arguments in order.
#[test]
#[serial]
fn argv_reaches_engine_in_order() {
    let native = Arc::new(FakeEngine::new(NATIVE_RUNTIME));
    let dir = tempfile::tempdir().unwrap();
    let library = Ocre::initialize(OcreConfig {
        extra_runtimes: vec![Arc::clone(&native) as Arc<dyn RuntimeEngine>],
        default_workdir: Some(dir.path().join("default")),
        ..Default::default()
    })
    .unwrap();
    let context = library.create_context(Some(dir.path())).unwrap();

    let mut request = native_request("echo");
    request.image = "echo.wasm".to_string();
    request.args.argv = vec!["alpha".to_string(), "beta".to_string()];
    context.create_container(request).unwrap();

    let spec = native.instances()[0].spec().clone();
    assert_eq!(spec.argv.len(), 3);
    assert!(spec.argv[0].ends_with("images/echo.wasm"));
    assert_eq!(&spec.argv[1..], &["alpha".to_string(), "beta".to_string()]);

    library.deinitialize();
}
