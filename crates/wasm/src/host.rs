// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! The `ocre` host import table.
//!
//! Guest-facing ABI: plain i32/i64 arguments, 0 on success, negative errno
//! on failure. Strings cross the boundary as (pointer, length) pairs into
//! the guest's linear memory.

use crate::engine::GuestState;
use ocre_core::{Error, Event, ModuleId, ResourceKind};
use ocre_events::PinDirection;
use ocre_events::PinState;
use std::time::Duration;
use tracing::debug;
use wasmtime::{Caller, Linker, Memory};

const ERRNO_NOENT: i32 = -2;
const ERRNO_IO: i32 = -5;
const ERRNO_BUSY: i32 = -16;
const ERRNO_INVAL: i32 = -22;
const ERRNO_NOTSUP: i32 = -95;
const ERRNO_NOBUFS: i32 = -105;

fn errno(e: &Error) -> i32 {
    match e {
        Error::InvalidArgument(_) => ERRNO_INVAL,
        Error::NotFound(_) => ERRNO_NOENT,
        Error::Conflict(_) | Error::WrongState { .. } => ERRNO_BUSY,
        Error::Unsupported(_) => ERRNO_NOTSUP,
        Error::ResourceExhausted(_) => ERRNO_NOBUFS,
        Error::Engine(_) | Error::Io(_) => ERRNO_IO,
    }
}

fn as_result(result: Result<(), Error>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            debug!(error = %e, "host call failed");
            errno(&e)
        }
    }
}

fn memory_of(caller: &mut Caller<'_, GuestState>) -> Result<Memory, i32> {
    caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or(ERRNO_INVAL)
}

fn module_of(caller: &Caller<'_, GuestState>) -> Result<ModuleId, i32> {
    caller.data().module.ok_or(ERRNO_INVAL)
}

fn read_guest_bytes(
    caller: &mut Caller<'_, GuestState>,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>, i32> {
    let memory = memory_of(caller)?;
    let mut buf = vec![0u8; len as usize];
    memory.read(&*caller, ptr as usize, &mut buf).map_err(|_| ERRNO_INVAL)?;
    Ok(buf)
}

fn read_guest_string(
    caller: &mut Caller<'_, GuestState>,
    ptr: u32,
    len: u32,
) -> Result<String, i32> {
    let bytes = read_guest_bytes(caller, ptr, len)?;
    String::from_utf8(bytes).map_err(|_| ERRNO_INVAL)
}

fn write_guest_u32(
    caller: &mut Caller<'_, GuestState>,
    ptr: u32,
    value: u32,
) -> Result<(), i32> {
    let memory = memory_of(caller)?;
    memory
        .write(&mut *caller, ptr as usize, &value.to_le_bytes())
        .map_err(|_| ERRNO_INVAL)
}

/// Call the guest allocator's `free` for a buffer the host placed in guest
/// memory.
fn guest_free(caller: &mut Caller<'_, GuestState>, offset: u32) {
    let Some(free) = caller
        .get_export("free")
        .and_then(|e| e.into_func())
    else {
        return;
    };
    let Ok(free) = free.typed::<i32, ()>(&*caller) else {
        return;
    };
    if free.call(&mut *caller, offset as i32).is_err() {
        debug!(offset, "guest free trapped");
    }
}

macro_rules! try_errno {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(code) => return code,
        }
    };
}

/// Register the whole `ocre` import module.
pub(crate) fn add_to_linker(linker: &mut Linker<GuestState>) -> anyhow::Result<()> {
    // -- dispatcher registration and the event pull primitive --

    linker.func_wrap(
        "ocre",
        "ocre_register_dispatcher",
        |mut caller: Caller<'_, GuestState>, kind: i32, name_ptr: i32, name_len: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let Some(kind) = ResourceKind::from_index(kind as u32) else {
                return ERRNO_INVAL;
            };
            let name =
                try_errno!(read_guest_string(&mut caller, name_ptr as u32, name_len as u32));
            // The dispatcher must be a callable export of this module.
            if caller.get_export(&name).and_then(|e| e.into_func()).is_none() {
                return ERRNO_NOENT;
            }
            let hub = caller.data().hub.clone();
            as_result(hub.registry().register_dispatcher(module, kind, &name))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_get_event",
        |mut caller: Caller<'_, GuestState>,
         type_ptr: i32,
         id_ptr: i32,
         port_ptr: i32,
         state_ptr: i32|
         -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            // Message events carry guest buffers and are callback-only.
            let event = hub
                .queue()
                .try_pop_owned_matching(module, |e| !matches!(e, Event::Message { .. }));
            let Some(event) = event else {
                return ERRNO_NOENT;
            };
            let (kind, id, port, state) = match event {
                Event::Timer { timer_id, .. } => (0u32, timer_id, 0, 0),
                Event::Gpio { pin, port, state, .. } => (1, pin, port, state),
                Event::Sensor { sensor_id, channel, value, .. } => {
                    (2, sensor_id, channel, value as u32)
                }
                Event::Message { .. } => return ERRNO_INVAL,
            };
            try_errno!(write_guest_u32(&mut caller, type_ptr as u32, kind));
            try_errno!(write_guest_u32(&mut caller, id_ptr as u32, id));
            try_errno!(write_guest_u32(&mut caller, port_ptr as u32, port));
            try_errno!(write_guest_u32(&mut caller, state_ptr as u32, state));
            0
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_event_data_free",
        |mut caller: Caller<'_, GuestState>, topic: i32, content_type: i32, payload: i32| {
            for offset in [topic, content_type, payload] {
                if offset > 0 {
                    guest_free(&mut caller, offset as u32);
                }
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_sleep",
        |caller: Caller<'_, GuestState>, ms: i32| -> i32 {
            let stop = caller.data().stop.clone();
            let mut remaining = ms.max(0) as u64;
            while remaining > 0 {
                if stop.load(std::sync::atomic::Ordering::SeqCst) {
                    return ERRNO_BUSY;
                }
                let chunk = remaining.min(50);
                std::thread::sleep(Duration::from_millis(chunk));
                remaining -= chunk;
            }
            0
        },
    )?;

    // -- timers --

    linker.func_wrap(
        "ocre",
        "ocre_timer_create",
        |caller: Caller<'_, GuestState>, id: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.timers().create(module, id as u32))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_timer_start",
        |caller: Caller<'_, GuestState>, id: i32, interval_ms: i32, periodic: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.timers().start_timer(
                module,
                id as u32,
                interval_ms.max(0) as u64,
                periodic != 0,
            ))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_timer_stop",
        |caller: Caller<'_, GuestState>, id: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.timers().stop_timer(module, id as u32))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_timer_get_remaining",
        |caller: Caller<'_, GuestState>, id: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            match hub.timers().remaining(module, id as u32) {
                Ok(ms) => ms.min(i32::MAX as u64) as i32,
                Err(e) => errno(&e),
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_timer_delete",
        |caller: Caller<'_, GuestState>, id: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.timers().delete(module, id as u32))
        },
    )?;

    // -- gpio --

    linker.func_wrap(
        "ocre",
        "ocre_gpio_configure",
        |caller: Caller<'_, GuestState>, port: i32, pin: i32, direction: i32| -> i32 {
            let hub = caller.data().hub.clone();
            let direction = if direction == 0 { PinDirection::Input } else { PinDirection::Output };
            as_result(hub.gpio().configure(port as u32, pin as u32, direction))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_gpio_set",
        |caller: Caller<'_, GuestState>, port: i32, pin: i32, state: i32| -> i32 {
            let hub = caller.data().hub.clone();
            as_result(hub.gpio().set(port as u32, pin as u32, PinState::from_level(state as u32)))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_gpio_get",
        |caller: Caller<'_, GuestState>, port: i32, pin: i32| -> i32 {
            let hub = caller.data().hub.clone();
            match hub.gpio().get(port as u32, pin as u32) {
                Ok(state) => state.level() as i32,
                Err(e) => errno(&e),
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_gpio_toggle",
        |caller: Caller<'_, GuestState>, port: i32, pin: i32| -> i32 {
            let hub = caller.data().hub.clone();
            match hub.gpio().toggle(port as u32, pin as u32) {
                Ok(state) => state.level() as i32,
                Err(e) => errno(&e),
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_gpio_register_callback",
        |caller: Caller<'_, GuestState>, port: i32, pin: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.gpio().register_callback(module, port as u32, pin as u32))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_gpio_unregister_callback",
        |caller: Caller<'_, GuestState>, port: i32, pin: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.gpio().unregister_callback(module, port as u32, pin as u32))
        },
    )?;

    // -- sensors --

    linker.func_wrap(
        "ocre",
        "ocre_sensors_discover",
        |caller: Caller<'_, GuestState>| -> i32 {
            let hub = caller.data().hub.clone();
            hub.sensors().discover().len() as i32
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_sensors_open",
        |caller: Caller<'_, GuestState>, sensor_id: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.sensors().open_channel(module, sensor_id as u32))
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_sensors_read",
        |caller: Caller<'_, GuestState>, sensor_id: i32, channel: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            match hub.sensors().read(module, sensor_id as u32, channel as u32) {
                Ok(value) => value,
                Err(e) => errno(&e),
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_sensors_subscribe",
        |caller: Caller<'_, GuestState>, sensor_id: i32, channel: i32, interval_ms: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            match hub.sensors().subscribe(
                module,
                sensor_id as u32,
                channel as u32,
                interval_ms.max(0) as u64,
            ) {
                Ok(sub_id) => sub_id as i32,
                Err(e) => errno(&e),
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_sensors_unsubscribe",
        |caller: Caller<'_, GuestState>, sub_id: i32| -> i32 {
            let module = try_errno!(module_of(&caller));
            let hub = caller.data().hub.clone();
            as_result(hub.sensors().unsubscribe(module, sub_id as u32))
        },
    )?;

    // -- messaging --

    linker.func_wrap(
        "ocre",
        "ocre_msg_publish",
        |mut caller: Caller<'_, GuestState>,
         topic_ptr: i32,
         topic_len: i32,
         ct_ptr: i32,
         ct_len: i32,
         payload_ptr: i32,
         payload_len: i32|
         -> i32 {
            let topic = try_errno!(read_guest_string(&mut caller, topic_ptr as u32, topic_len as u32));
            let content_type =
                try_errno!(read_guest_string(&mut caller, ct_ptr as u32, ct_len as u32));
            let payload =
                try_errno!(read_guest_bytes(&mut caller, payload_ptr as u32, payload_len as u32));
            let hub = caller.data().hub.clone();
            match hub.messaging().publish(&topic, &content_type, &payload) {
                Ok(delivered) => delivered as i32,
                Err(e) => errno(&e),
            }
        },
    )?;

    linker.func_wrap(
        "ocre",
        "ocre_msg_subscribe",
        |mut caller: Caller<'_, GuestState>,
         topic_ptr: i32,
         topic_len: i32,
         handler_ptr: i32,
         handler_len: i32|
         -> i32 {
            let module = try_errno!(module_of(&caller));
            let topic = try_errno!(read_guest_string(&mut caller, topic_ptr as u32, topic_len as u32));
            let handler =
                try_errno!(read_guest_string(&mut caller, handler_ptr as u32, handler_len as u32));
            if caller.get_export(&handler).and_then(|e| e.into_func()).is_none() {
                return ERRNO_NOENT;
            }
            let hub = caller.data().hub.clone();
            as_result(hub.messaging().subscribe(module, &topic, &handler))
        },
    )?;

    Ok(())
}
