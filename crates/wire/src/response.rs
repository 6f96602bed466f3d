// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Responses: `[opcode, rc, ...fields]`.
//!
//! `rc` is 0 for success (followed by the operation's typed fields) and 1
//! for failure (followed by an error kind and a message).

use crate::framing::ProtocolError;
use crate::request::opcode;
use serde_cbor::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub id: String,
    pub status: String,
    pub image: String,
}

/// Success payload, shaped by the request's opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Empty,
    Id(String),
    ExitCode(i32),
    Status(String),
    Containers(Vec<ContainerEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok { opcode: u64, body: ResponseBody },
    Err { opcode: u64, kind: String, message: String },
}

impl Response {
    pub fn ok(opcode: u64, body: ResponseBody) -> Self {
        Self::Ok { opcode, body }
    }

    pub fn err(opcode: u64, kind: &str, message: impl Into<String>) -> Self {
        Self::Err { opcode, kind: kind.to_string(), message: message.into() }
    }

    pub fn opcode(&self) -> u64 {
        match self {
            Self::Ok { opcode, .. } | Self::Err { opcode, .. } => *opcode,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::Ok { opcode, body } => {
                let mut fields =
                    vec![Value::Integer(*opcode as i128), Value::Integer(0)];
                match body {
                    ResponseBody::Empty => {}
                    ResponseBody::Id(id) => fields.push(Value::Text(id.clone())),
                    ResponseBody::ExitCode(code) => fields.push(Value::Integer(*code as i128)),
                    ResponseBody::Status(status) => fields.push(Value::Text(status.clone())),
                    ResponseBody::Containers(entries) => {
                        fields.push(Value::Array(
                            entries
                                .iter()
                                .map(|e| {
                                    Value::Array(vec![
                                        Value::Text(e.id.clone()),
                                        Value::Text(e.status.clone()),
                                        Value::Text(e.image.clone()),
                                    ])
                                })
                                .collect(),
                        ));
                    }
                }
                Value::Array(fields)
            }
            Self::Err { opcode, kind, message } => Value::Array(vec![
                Value::Integer(*opcode as i128),
                Value::Integer(1),
                Value::Text(kind.clone()),
                Value::Text(message.clone()),
            ]),
        }
    }

    pub(crate) fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Array(fields) = value else {
            return Err(ProtocolError::Malformed("response is not an array"));
        };
        let op = match fields.first() {
            Some(Value::Integer(n)) if *n >= 0 => *n as u64,
            _ => return Err(ProtocolError::Malformed("response opcode")),
        };
        let rc = match fields.get(1) {
            Some(Value::Integer(n)) => *n,
            _ => return Err(ProtocolError::Malformed("response rc")),
        };

        if rc != 0 {
            let kind = match fields.get(2) {
                Some(Value::Text(s)) => s.clone(),
                _ => return Err(ProtocolError::Malformed("error kind")),
            };
            let message = match fields.get(3) {
                Some(Value::Text(s)) => s.clone(),
                _ => return Err(ProtocolError::Malformed("error message")),
            };
            return Ok(Self::Err { opcode: op, kind, message });
        }

        let body = match op {
            opcode::CONTAINER_CREATE => match fields.get(2) {
                Some(Value::Text(id)) => ResponseBody::Id(id.clone()),
                _ => return Err(ProtocolError::Malformed("created id")),
            },
            opcode::CONTAINER_WAIT => match fields.get(2) {
                Some(Value::Integer(code)) => ResponseBody::ExitCode(*code as i32),
                _ => return Err(ProtocolError::Malformed("exit code")),
            },
            opcode::CONTAINER_STATUS => match fields.get(2) {
                Some(Value::Text(status)) => ResponseBody::Status(status.clone()),
                _ => return Err(ProtocolError::Malformed("status")),
            },
            opcode::CONTAINER_LIST => match fields.get(2) {
                Some(Value::Array(items)) => {
                    let mut entries = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Array(cols) = item else {
                            return Err(ProtocolError::Malformed("list entry"));
                        };
                        match (cols.first(), cols.get(1), cols.get(2)) {
                            (
                                Some(Value::Text(id)),
                                Some(Value::Text(status)),
                                Some(Value::Text(image)),
                            ) => entries.push(ContainerEntry {
                                id: id.clone(),
                                status: status.clone(),
                                image: image.clone(),
                            }),
                            _ => return Err(ProtocolError::Malformed("list entry fields")),
                        }
                    }
                    ResponseBody::Containers(entries)
                }
                _ => return Err(ProtocolError::Malformed("container list")),
            },
            _ => ResponseBody::Empty,
        };

        Ok(Self::Ok { opcode: op, body })
    }
}
