// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ocre-wire: IPC protocol between the `ocre` client and the `ocred`
//! supervisor.
//!
//! Wire format: each message is one CBOR array whose first element is a uint
//! opcode. Responses echo the request's opcode followed by a result code and
//! the typed result fields. Absent optional strings are CBOR null. CBOR is
//! self-delimiting, so there is no length prefix.

mod framing;
mod request;
mod response;

pub use framing::{read_request, read_response, write_request, write_response, ProtocolError};
pub use request::{opcode, Request};
pub use response::{ContainerEntry, Response, ResponseBody};
