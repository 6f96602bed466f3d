// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Locked PID file so only one supervisor runs per workdir.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct PidFile {
    path: PathBuf,
    // Held for the lock; the lock dies with the file handle.
    _file: File,
}

impl PidFile {
    /// Create and lock the PID file. Fails if another daemon holds the lock.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("another daemon holds '{}'", path.display()),
            )
        })?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { path: path.to_path_buf(), _file: file })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
