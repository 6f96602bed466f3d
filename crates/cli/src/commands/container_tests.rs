// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

use super::*;

fn options() -> CreateOptions {
    CreateOptions {
        detached: true,
        name: Some("foo".to_string()),
        runtime: Some("wamr/wasip1".to_string()),
        mounts: vec!["/a:/b".to_string()],
        capabilities: vec!["ocre:api".to_string()],
        env: vec!["KEY=value".to_string()],
    }
}

#[test]
fn create_request_carries_all_options() {
    let request = create_request(
        &options(),
        "hello.wasm".to_string(),
        vec!["arg1".to_string()],
    );
    assert_eq!(
        request,
        Request::ContainerCreate {
            image: "hello.wasm".to_string(),
            runtime: Some("wamr/wasip1".to_string()),
            id: Some("foo".to_string()),
            detached: true,
            argv: vec!["arg1".to_string()],
            envp: vec!["KEY=value".to_string()],
            capabilities: vec!["ocre:api".to_string()],
            mounts: vec!["/a:/b".to_string()],
        }
    );
}

#[test]
fn expect_id_rejects_other_bodies() {
    assert_eq!(expect_id(ResponseBody::Id("x".to_string())).unwrap(), "x");
    assert!(expect_id(ResponseBody::Empty).is_err());
}
