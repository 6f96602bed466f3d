// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! A context: the set of containers sharing one working directory.

use crate::container::{Container, ContainerArgs};
use crate::library::EngineSet;
use crate::workdir;
use ocre_core::{is_valid_name, random_id, Error, InstanceSpec, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Attempts at finding an unused random container ID before giving up.
const RANDOM_ID_TRIES: usize = 100;

/// Arguments to [`Context::create_container`].
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub image: String,
    /// Runtime engine name; the default engine when absent.
    pub runtime: Option<String>,
    /// Container ID; auto-generated when absent.
    pub id: Option<String>,
    pub detached: bool,
    pub args: ContainerArgs,
}

struct ContainerNode {
    container: Arc<Container>,
    /// Per-container mount root, present iff the `filesystem` capability was
    /// requested.
    workdir: Option<PathBuf>,
}

pub struct Context {
    workdir: PathBuf,
    engines: Arc<EngineSet>,
    containers: Mutex<Vec<ContainerNode>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("workdir", &self.workdir)
            .finish()
    }
}

/// `<absolute-src>:<absolute-dst>`, destination not `/`.
fn validate_mount(mount: &str) -> Result<()> {
    if !mount.starts_with('/') {
        return Err(Error::invalid_argument(format!(
            "invalid mount '{mount}': source must be an absolute path"
        )));
    }
    let Some((_, dst)) = mount.split_once(':') else {
        return Err(Error::invalid_argument(format!(
            "invalid mount '{mount}': must be <source>:<destination>"
        )));
    };
    if !dst.starts_with('/') {
        return Err(Error::invalid_argument(format!(
            "invalid mount '{mount}': destination must be an absolute path"
        )));
    }
    if dst == "/" {
        return Err(Error::invalid_argument(format!(
            "invalid mount '{mount}': destination must not be '/'"
        )));
    }
    Ok(())
}

impl Context {
    pub(crate) fn new(workdir: PathBuf, engines: Arc<EngineSet>) -> Self {
        Self { workdir, engines, containers: Mutex::new(Vec::new()) }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Create a container in this context.
    ///
    /// Validates names and mounts, resolves the runtime, allocates an ID,
    /// prepares the per-container workdir when requested, and invokes the
    /// engine. On any error the half-built workdir is removed.
    pub fn create_container(&self, request: CreateRequest) -> Result<Arc<Container>> {
        if !is_valid_name(&request.image) {
            return Err(Error::invalid_argument(format!(
                "invalid image name '{}': valid are [a-z0-9._-], not starting with '.'",
                request.image
            )));
        }
        if let Some(id) = &request.id {
            if !is_valid_name(id) {
                return Err(Error::invalid_argument(format!(
                    "invalid container ID '{id}': valid are [a-z0-9._-], not starting with '.'"
                )));
            }
        }
        for mount in &request.args.mounts {
            validate_mount(mount)?;
        }

        let engine = match &request.runtime {
            Some(name) => self
                .engines
                .get(name)
                .ok_or_else(|| Error::not_found(format!("runtime '{name}'")))?,
            None => self.engines.default_engine(),
        };

        // Reserve the ID under the lock; the engine call below must happen
        // with no context lock held.
        let id = {
            let containers = self.containers.lock();
            match request.id {
                Some(id) => {
                    if containers.iter().any(|n| n.container.id() == id) {
                        return Err(Error::conflict(format!(
                            "container ID '{id}' already exists"
                        )));
                    }
                    id
                }
                None => self.unique_random_id(&containers)?,
            }
        };

        // Image existence is not checked here; the engine may fetch lazily.
        let image_path = workdir::image_path(&self.workdir, &request.image);

        let container_workdir = if request.args.capabilities.iter().any(|c| c == "filesystem") {
            let path = workdir::container_workdir(&self.workdir, &id);
            std::fs::create_dir_all(&path)?;
            Some(path)
        } else {
            None
        };

        let mut argv = Vec::with_capacity(request.args.argv.len() + 1);
        argv.push(image_path.to_string_lossy().into_owned());
        argv.extend(request.args.argv.iter().cloned());

        let spec = InstanceSpec {
            image_path,
            workdir: container_workdir.clone(),
            capabilities: request.args.capabilities.clone(),
            argv,
            envp: request.args.envp.clone(),
            mounts: request.args.mounts.clone(),
        };

        let container = match Container::create(&id, request.detached, &engine, spec) {
            Ok(container) => container,
            Err(e) => {
                error!(id = %id, error = %e, "failed to create container");
                if let Some(path) = &container_workdir {
                    workdir::remove_recursively(path);
                }
                return Err(e);
            }
        };

        let mut containers = self.containers.lock();
        // A racing caller may have claimed the ID while the engine was
        // creating the instance.
        if containers.iter().any(|n| n.container.id() == id) {
            drop(containers);
            if let Some(path) = &container_workdir {
                workdir::remove_recursively(path);
            }
            return Err(Error::conflict(format!("container ID '{id}' already exists")));
        }
        containers.push(ContainerNode {
            container: Arc::clone(&container),
            workdir: container_workdir,
        });

        Ok(container)
    }

    fn unique_random_id(&self, containers: &[ContainerNode]) -> Result<String> {
        for _ in 0..RANDOM_ID_TRIES {
            let candidate = random_id();
            if !containers.iter().any(|n| n.container.id() == candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::ResourceExhausted("random container IDs"))
    }

    pub fn get_container_by_id(&self, id: &str) -> Option<Arc<Container>> {
        self.containers
            .lock()
            .iter()
            .find(|n| n.container.id() == id)
            .map(|n| Arc::clone(&n.container))
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().len()
    }

    /// Snapshot of the containers, in creation order.
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.containers.lock().iter().map(|n| Arc::clone(&n.container)).collect()
    }

    /// Remove a container. Only valid once the container is stopped, still
    /// just created, or in error.
    pub fn remove_container(&self, container: &Arc<Container>) -> Result<()> {
        container.ensure_removable()?;

        let mut containers = self.containers.lock();
        let index = containers
            .iter()
            .position(|n| Arc::ptr_eq(&n.container, container))
            .ok_or_else(|| Error::not_found(format!("container '{}'", container.id())))?;

        let node = containers.remove(index);
        drop(containers);

        if let Some(path) = &node.workdir {
            workdir::remove_recursively(path);
        }
        info!(id = container.id(), "removed container");
        Ok(())
    }

    pub fn remove_container_by_id(&self, id: &str) -> Result<()> {
        let container = self
            .get_container_by_id(id)
            .ok_or_else(|| Error::not_found(format!("container '{id}'")))?;
        self.remove_container(&container)
    }

    /// Kill every container, wait for each, then remove them all. Errors are
    /// logged, never surfaced.
    pub fn destroy(&self) {
        let containers = self.containers();

        for container in &containers {
            if let Err(e) = container.kill() {
                // Containers that never started have nothing to kill.
                tracing::debug!(id = container.id(), error = %e, "kill during destroy");
            }
        }
        for container in &containers {
            if let Err(e) = container.wait() {
                tracing::debug!(id = container.id(), error = %e, "wait during destroy");
            }
        }
        for container in &containers {
            if let Err(e) = self.remove_container(container) {
                warn!(id = container.id(), error = %e, "failed to remove container during destroy");
            }
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
