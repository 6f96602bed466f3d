// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Working-directory layout and filesystem glue.
//!
//! A context's workdir holds `images/` (caller-managed image files) and
//! `containers/` (per-container mount roots, created on demand and removed
//! with their container).

use ocre_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const IMAGES_DIR: &str = "images";
pub const CONTAINERS_DIR: &str = "containers";

/// Resolve the default workdir: `OCRE_STATE_DIR` > XDG state dir >
/// `~/.local/state/ocre`.
pub fn default_workdir() -> PathBuf {
    if let Ok(dir) = std::env::var("OCRE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(state) = dirs::state_dir() {
        return state.join("ocre");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/state/ocre")
}

pub fn images_dir(workdir: &Path) -> PathBuf {
    workdir.join(IMAGES_DIR)
}

pub fn containers_dir(workdir: &Path) -> PathBuf {
    workdir.join(CONTAINERS_DIR)
}

pub fn image_path(workdir: &Path, image: &str) -> PathBuf {
    images_dir(workdir).join(image)
}

pub fn container_workdir(workdir: &Path, id: &str) -> PathBuf {
    containers_dir(workdir).join(id)
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::invalid_argument(format!(
                "'{}' exists and is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    info!(path = %path.display(), "creating directory");
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Materialize `<workdir>/images` and `<workdir>/containers`.
pub fn populate_workdir(workdir: &Path) -> Result<()> {
    ensure_dir(workdir)?;
    ensure_dir(&images_dir(workdir))?;
    ensure_dir(&containers_dir(workdir))?;
    Ok(())
}

/// Purge stale per-container subtrees left over from a previous run.
pub fn purge_container_dirs(workdir: &Path) -> Result<()> {
    let containers = containers_dir(workdir);
    for entry in std::fs::read_dir(&containers)? {
        let entry = entry?;
        let path = entry.path();
        info!(path = %path.display(), "purging stale container directory");
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Best-effort recursive removal for cleanup paths: logs and continues.
pub fn remove_recursively(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "failed to remove directory");
    }
}

#[cfg(test)]
#[path = "workdir_tests.rs"]
mod tests;
