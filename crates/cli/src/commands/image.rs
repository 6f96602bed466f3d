// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! `ocre image` subcommands: manage files under `<workdir>/images/`.

use crate::exit_error::ExitError;
use crate::Globals;
use clap::Subcommand;
use ocre_engine::workdir;
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// List images
    Ls,
    /// Fetch an image from a URL or local path into the image store
    Pull {
        url: String,
        /// Store under this name (defaults to the URL's last segment)
        name: Option<String>,
    },
    /// Remove an image
    Rm { name: String },
}

pub async fn run(command: ImageCommand, globals: &Globals) -> Result<(), ExitError> {
    match command {
        ImageCommand::Ls => ls(&globals.workdir),
        ImageCommand::Pull { url, name } => pull(&globals.workdir, &url, name.as_deref()).await,
        ImageCommand::Rm { name } => rm(&globals.workdir, &name),
    }
}

fn ls(dir: &Path) -> Result<(), ExitError> {
    let images = workdir::images_dir(dir);
    let entries = std::fs::read_dir(&images)
        .map_err(|e| ExitError::failure(format!("cannot read '{}': {e}", images.display())))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Derive the stored image name from an explicit name or the URL.
fn image_name(url: &str, name: Option<&str>) -> Result<String, ExitError> {
    let name = match name {
        Some(name) => name.to_string(),
        None => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .to_string(),
    };
    if !ocre_engine::is_valid_name(&name) {
        return Err(ExitError::failure(format!(
            "invalid image name '{name}': valid are [a-z0-9._-], not starting with '.'"
        )));
    }
    Ok(name)
}

async fn pull(dir: &Path, url: &str, name: Option<&str>) -> Result<(), ExitError> {
    let name = image_name(url, name)?;
    let images = workdir::images_dir(dir);
    std::fs::create_dir_all(&images)
        .map_err(|e| ExitError::failure(format!("cannot create '{}': {e}", images.display())))?;
    let target = images.join(&name);

    if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExitError::failure(format!("download failed: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExitError::failure(format!("download failed: {e}")))?;
        std::fs::write(&target, &bytes)
            .map_err(|e| ExitError::failure(format!("cannot write '{}': {e}", target.display())))?;
    } else {
        let source = url.strip_prefix("file://").unwrap_or(url);
        std::fs::copy(source, &target)
            .map_err(|e| ExitError::failure(format!("cannot copy '{source}': {e}")))?;
    }

    println!("{name}");
    Ok(())
}

fn rm(dir: &Path, name: &str) -> Result<(), ExitError> {
    let path = workdir::images_dir(dir).join(name);
    std::fs::remove_file(&path)
        .map_err(|e| ExitError::failure(format!("cannot remove '{}': {e}", path.display())))
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
