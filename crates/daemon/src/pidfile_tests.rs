// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;

#[test]
fn acquire_writes_our_pid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocred.pid");

    let pidfile = PidFile::acquire(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.trim(), std::process::id().to_string());
    drop(pidfile);

    // Released on drop.
    assert!(!path.exists());
}

#[test]
fn second_acquire_in_process_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocred.pid");

    let _held = PidFile::acquire(&path).unwrap();
    assert!(PidFile::acquire(&path).is_err());
}

#[test]
fn stale_unlocked_file_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocred.pid");
    std::fs::write(&path, "99999\n").unwrap();

    let _pidfile = PidFile::acquire(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.trim(), std::process::id().to_string());
}
