// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Requests: opcode-first CBOR arrays.

use crate::framing::ProtocolError;
use serde_cbor::Value;

/// Opcodes cover every public context/container operation.
pub mod opcode {
    pub const PING: u64 = 0;
    pub const CONTAINER_CREATE: u64 = 1;
    pub const CONTAINER_START: u64 = 2;
    pub const CONTAINER_STOP: u64 = 3;
    pub const CONTAINER_KILL: u64 = 4;
    pub const CONTAINER_PAUSE: u64 = 5;
    pub const CONTAINER_UNPAUSE: u64 = 6;
    pub const CONTAINER_WAIT: u64 = 7;
    pub const CONTAINER_STATUS: u64 = 8;
    pub const CONTAINER_REMOVE: u64 = 9;
    pub const CONTAINER_LIST: u64 = 10;
    pub const SHUTDOWN: u64 = 11;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    ContainerCreate {
        image: String,
        runtime: Option<String>,
        id: Option<String>,
        detached: bool,
        argv: Vec<String>,
        envp: Vec<String>,
        capabilities: Vec<String>,
        mounts: Vec<String>,
    },
    ContainerStart { id: String },
    ContainerStop { id: String },
    ContainerKill { id: String },
    ContainerPause { id: String },
    ContainerUnpause { id: String },
    ContainerWait { id: String },
    ContainerStatus { id: String },
    ContainerRemove { id: String },
    ContainerList,
    Shutdown,
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn optional_text(s: &Option<String>) -> Value {
    match s {
        Some(s) => text(s),
        None => Value::Null,
    }
}

fn text_array(items: &[String]) -> Value {
    Value::Array(items.iter().map(|s| text(s)).collect())
}

fn expect_u64(value: &Value, what: &'static str) -> Result<u64, ProtocolError> {
    match value {
        Value::Integer(n) if *n >= 0 => Ok(*n as u64),
        _ => Err(ProtocolError::Malformed(what)),
    }
}

fn expect_text(value: &Value, what: &'static str) -> Result<String, ProtocolError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        _ => Err(ProtocolError::Malformed(what)),
    }
}

fn expect_optional_text(value: &Value, what: &'static str) -> Result<Option<String>, ProtocolError> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s.clone())),
        _ => Err(ProtocolError::Malformed(what)),
    }
}

fn expect_bool(value: &Value, what: &'static str) -> Result<bool, ProtocolError> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(ProtocolError::Malformed(what)),
    }
}

fn expect_text_array(value: &Value, what: &'static str) -> Result<Vec<String>, ProtocolError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(|v| expect_text(v, what)).collect(),
        _ => Err(ProtocolError::Malformed(what)),
    }
}

impl Request {
    pub fn opcode(&self) -> u64 {
        match self {
            Self::Ping => opcode::PING,
            Self::ContainerCreate { .. } => opcode::CONTAINER_CREATE,
            Self::ContainerStart { .. } => opcode::CONTAINER_START,
            Self::ContainerStop { .. } => opcode::CONTAINER_STOP,
            Self::ContainerKill { .. } => opcode::CONTAINER_KILL,
            Self::ContainerPause { .. } => opcode::CONTAINER_PAUSE,
            Self::ContainerUnpause { .. } => opcode::CONTAINER_UNPAUSE,
            Self::ContainerWait { .. } => opcode::CONTAINER_WAIT,
            Self::ContainerStatus { .. } => opcode::CONTAINER_STATUS,
            Self::ContainerRemove { .. } => opcode::CONTAINER_REMOVE,
            Self::ContainerList => opcode::CONTAINER_LIST,
            Self::Shutdown => opcode::SHUTDOWN,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut fields = vec![Value::Integer(self.opcode() as i128)];
        match self {
            Self::Ping | Self::ContainerList | Self::Shutdown => {}
            Self::ContainerCreate {
                image,
                runtime,
                id,
                detached,
                argv,
                envp,
                capabilities,
                mounts,
            } => {
                fields.push(text(image));
                fields.push(optional_text(runtime));
                fields.push(optional_text(id));
                fields.push(Value::Bool(*detached));
                fields.push(text_array(argv));
                fields.push(text_array(envp));
                fields.push(text_array(capabilities));
                fields.push(text_array(mounts));
            }
            Self::ContainerStart { id }
            | Self::ContainerStop { id }
            | Self::ContainerKill { id }
            | Self::ContainerPause { id }
            | Self::ContainerUnpause { id }
            | Self::ContainerWait { id }
            | Self::ContainerStatus { id }
            | Self::ContainerRemove { id } => fields.push(text(id)),
        }
        Value::Array(fields)
    }

    pub(crate) fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Array(fields) = value else {
            return Err(ProtocolError::Malformed("request is not an array"));
        };
        let Some(op) = fields.first() else {
            return Err(ProtocolError::Malformed("empty request array"));
        };
        let op = expect_u64(op, "opcode")?;
        let arg = |index: usize| -> Result<&Value, ProtocolError> {
            fields.get(index).ok_or(ProtocolError::Malformed("missing request field"))
        };

        let id_request = |build: fn(String) -> Request| -> Result<Request, ProtocolError> {
            Ok(build(expect_text(arg(1)?, "container id")?))
        };

        match op {
            opcode::PING => Ok(Self::Ping),
            opcode::CONTAINER_CREATE => Ok(Self::ContainerCreate {
                image: expect_text(arg(1)?, "image")?,
                runtime: expect_optional_text(arg(2)?, "runtime")?,
                id: expect_optional_text(arg(3)?, "container id")?,
                detached: expect_bool(arg(4)?, "detached")?,
                argv: expect_text_array(arg(5)?, "argv")?,
                envp: expect_text_array(arg(6)?, "envp")?,
                capabilities: expect_text_array(arg(7)?, "capabilities")?,
                mounts: expect_text_array(arg(8)?, "mounts")?,
            }),
            opcode::CONTAINER_START => id_request(|id| Self::ContainerStart { id }),
            opcode::CONTAINER_STOP => id_request(|id| Self::ContainerStop { id }),
            opcode::CONTAINER_KILL => id_request(|id| Self::ContainerKill { id }),
            opcode::CONTAINER_PAUSE => id_request(|id| Self::ContainerPause { id }),
            opcode::CONTAINER_UNPAUSE => id_request(|id| Self::ContainerUnpause { id }),
            opcode::CONTAINER_WAIT => id_request(|id| Self::ContainerWait { id }),
            opcode::CONTAINER_STATUS => id_request(|id| Self::ContainerStatus { id }),
            opcode::CONTAINER_REMOVE => id_request(|id| Self::ContainerRemove { id }),
            opcode::CONTAINER_LIST => Ok(Self::ContainerList),
            opcode::SHUTDOWN => Ok(Self::Shutdown),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}
