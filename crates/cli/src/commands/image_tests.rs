// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "hello.wasm", None, "hello.wasm" },
    from_url = { "https://example.com/images/blinky.wasm", None, "blinky.wasm" },
    trailing_slash = { "https://example.com/app/", None, "app" },
    renamed = { "https://example.com/x.wasm", Some("renamed.wasm"), "renamed.wasm" },
)]
fn image_name_derivation(url: &str, name: Option<&str>, expected: &str) {
    assert_eq!(image_name(url, name).unwrap(), expected);
}

#[parameterized(
    uppercase = { "https://example.com/Hello.wasm" },
    hidden = { "https://example.com/.hidden" },
)]
fn invalid_derived_names_are_rejected(url: &str) {
    assert!(image_name(url, None).is_err());
}

#[tokio::test]
async fn pull_copies_local_files_and_ls_lists_them() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.wasm");
    std::fs::write(&source, b"\0asm").unwrap();

    pull(dir.path(), source.to_str().unwrap(), Some("copied.wasm"))
        .await
        .unwrap();
    assert!(dir.path().join("images/copied.wasm").is_file());

    ls(dir.path()).unwrap();

    rm(dir.path(), "copied.wasm").unwrap();
    assert!(!dir.path().join("images/copied.wasm").exists());
}

#[test]
fn rm_missing_image_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("images")).unwrap();
    assert!(rm(dir.path(), "ghost.wasm").is_err());
}
