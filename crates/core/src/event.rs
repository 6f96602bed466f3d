// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Event records flowing from host resource managers to sandbox callbacks.

use serde::{Deserialize, Serialize};

/// Opaque handle for a live sandbox module instance.
///
/// Allocated by the module registry on registration; host resources are
/// tagged with the `ModuleId` of the module that created them, and cleanup is
/// driven by module lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mod-{}", self.0)
    }
}

/// Host resource categories. Indexes dispatcher tables and per-module
/// resource counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Timer,
    Gpio,
    Sensor,
    Messaging,
}

impl ResourceKind {
    pub const COUNT: usize = 4;

    pub const ALL: [ResourceKind; Self::COUNT] = [
        ResourceKind::Timer,
        ResourceKind::Gpio,
        ResourceKind::Sensor,
        ResourceKind::Messaging,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Timer => 0,
            Self::Gpio => 1,
            Self::Sensor => 2,
            Self::Messaging => 3,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Timer),
            1 => Some(Self::Gpio),
            2 => Some(Self::Sensor),
            3 => Some(Self::Messaging),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Gpio => "gpio",
            Self::Sensor => "sensor",
            Self::Messaging => "messaging",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offset of a buffer previously duplicated into the owner sandbox's linear
/// memory.
pub type GuestRef = u32;

/// A typed event queued for dispatch into a sandbox.
///
/// Message buffers are copied into the destination sandbox before the event
/// is enqueued, so dispatch never performs host-to-guest copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Timer {
        timer_id: u32,
        owner: ModuleId,
    },
    Gpio {
        pin: u32,
        port: u32,
        state: u32,
        owner: ModuleId,
    },
    Sensor {
        sensor_id: u32,
        channel: u32,
        value: i32,
        owner: ModuleId,
    },
    Message {
        message_id: u64,
        topic: GuestRef,
        content_type: GuestRef,
        payload: GuestRef,
        payload_len: u32,
        owner: ModuleId,
    },
}

impl Event {
    pub fn owner(&self) -> ModuleId {
        match *self {
            Self::Timer { owner, .. }
            | Self::Gpio { owner, .. }
            | Self::Sensor { owner, .. }
            | Self::Message { owner, .. } => owner,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Timer { .. } => ResourceKind::Timer,
            Self::Gpio { .. } => ResourceKind::Gpio,
            Self::Sensor { .. } => ResourceKind::Sensor,
            Self::Message { .. } => ResourceKind::Messaging,
        }
    }

    /// Argument packing for the module-registered dispatcher.
    pub fn dispatch_call(&self) -> DispatchCall {
        match *self {
            Self::Timer { timer_id, .. } => DispatchCall::Timer { timer_id },
            Self::Gpio { pin, state, .. } => DispatchCall::Gpio { pin, state },
            Self::Sensor { sensor_id, channel, value, .. } => DispatchCall::Sensor {
                sensor_id,
                channel,
                value,
            },
            Self::Message { message_id, topic, content_type, payload, payload_len, .. } => {
                DispatchCall::Message {
                    message_id,
                    topic,
                    content_type,
                    payload,
                    payload_len,
                }
            }
        }
    }
}

/// Per-variant argument tuple handed to an execution environment when the
/// dispatcher invokes a guest callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchCall {
    Timer { timer_id: u32 },
    Gpio { pin: u32, state: u32 },
    Sensor { sensor_id: u32, channel: u32, value: i32 },
    Message {
        message_id: u64,
        topic: GuestRef,
        content_type: GuestRef,
        payload: GuestRef,
        payload_len: u32,
    },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
