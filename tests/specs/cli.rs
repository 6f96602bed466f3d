// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! CLI surface specs: argument parsing and offline failure modes.

use assert_cmd::Command;

fn ocre() -> Command {
    Command::cargo_bin("ocre").unwrap()
}

#[test]
fn help_lists_top_level_commands() {
    let assert = ocre().arg("--help").assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    for command in ["image", "container", "daemon"] {
        assert!(output.contains(command), "missing '{command}' in: {output}");
    }
}

#[test]
fn container_help_lists_lifecycle_commands() {
    let assert = ocre().args(["container", "--help"]).assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    for command in ["create", "run", "start", "kill", "wait", "ps", "rm"] {
        assert!(output.contains(command), "missing '{command}' in: {output}");
    }
}

#[test]
fn unknown_subcommand_fails() {
    ocre().arg("frobnicate").assert().failure();
}

#[test]
fn container_commands_fail_cleanly_without_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("nope.sock");

    let assert = ocre()
        .args(["-H", socket.to_str().unwrap(), "container", "ps"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("cannot connect"), "stderr: {stderr}");
    // One line on stderr.
    assert_eq!(stderr.trim_end().lines().count(), 1, "stderr: {stderr}");
}

#[test]
fn image_ls_reports_missing_store() {
    let dir = tempfile::tempdir().unwrap();
    ocre()
        .args(["-w", dir.path().to_str().unwrap(), "image", "ls"])
        .assert()
        .failure();
}

#[test]
fn image_pull_and_ls_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("img.wasm");
    std::fs::write(&source, b"\0asm").unwrap();

    ocre()
        .args([
            "-w",
            dir.path().to_str().unwrap(),
            "image",
            "pull",
            source.to_str().unwrap(),
            "pulled.wasm",
        ])
        .assert()
        .success()
        .stdout("pulled.wasm\n");

    ocre()
        .args(["-w", dir.path().to_str().unwrap(), "image", "ls"])
        .assert()
        .success()
        .stdout("pulled.wasm\n");

    ocre()
        .args(["-w", dir.path().to_str().unwrap(), "image", "rm", "pulled.wasm"])
        .assert()
        .success();
}
