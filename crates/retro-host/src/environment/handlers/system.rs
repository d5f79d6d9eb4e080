use std::{
    ffi::{c_char, c_uint, c_void},
    ptr::addr_of,
};

use rust_libretro_sys::{
    retro_disk_control_callback, retro_disk_control_ext_callback, retro_frame_time_callback,
    retro_memory_map, retro_message, retro_message_ext, retro_throttle_state,
};
use tracing::{debug, info};

use super::{read, write};
use crate::{
    environment::{DiskControl, FrameTimeCallback, c_string},
    session::{SessionEvent, StopReason, context::{CoreDir, SessionContext}},
};

const AUDIO_VIDEO_ENABLE_VIDEO: i32 = 1 << 0;
const AUDIO_VIDEO_ENABLE_AUDIO: i32 = 1 << 1;
const THROTTLE_NONE: c_uint = 0;
const MESSAGE_INTERFACE_VERSION: c_uint = 1;
const DISK_CONTROL_INTERFACE_VERSION: c_uint = 1;
const FALLBACK_FPS: f64 = 60.0;

pub(crate) unsafe fn set_message(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_message` per registration.
    let message = unsafe { read::<retro_message>(data) };
    // SAFETY: the message text is NUL-terminated and owned by the core for the call.
    let Some(text) = (unsafe { c_string(message.msg) }) else {
        return false;
    };
    info!(core = %ctx.core_name, frames = message.frames, "{text}");
    ctx.emit(SessionEvent::Message {
        text,
        frames: message.frames,
    });
    true
}

pub(crate) unsafe fn set_message_ext(ctx: &SessionContext, data: *mut c_void) -> bool {
    let message = data.cast::<retro_message_ext>();
    // Only the plain fields are read; the enum-typed ones may hold any value.
    // SAFETY: non-null `retro_message_ext` per registration.
    let (msg, duration_ms) = unsafe { (addr_of!((*message).msg).read(), addr_of!((*message).duration).read()) };
    // SAFETY: see `set_message`.
    let Some(text) = (unsafe { c_string(msg) }) else {
        return false;
    };
    let fps = ctx.env.lock().fps.unwrap_or(FALLBACK_FPS);
    let frames = (f64::from(duration_ms) * fps / 1000.0).round() as u32;
    info!(core = %ctx.core_name, duration_ms, "{text}");
    ctx.emit(SessionEvent::Message { text, frames });
    true
}

pub(crate) unsafe fn shutdown(ctx: &SessionContext, _data: *mut c_void) -> bool {
    info!(core = %ctx.core_name, "core requested shutdown");
    ctx.request_stop(StopReason::CoreShutdown);
    true
}

pub(crate) unsafe fn set_performance_level(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `unsigned` per registration.
    let level = unsafe { read::<c_uint>(data) };
    debug!(level, "performance level");
    ctx.env.lock().performance_level = level;
    true
}

unsafe fn write_dir(ctx: &SessionContext, data: *mut c_void, kind: CoreDir) -> bool {
    let Some(dir) = ctx.core_dir(kind) else {
        return false;
    };
    // SAFETY: non-null `const char **` per registration.
    unsafe { write::<*const c_char>(data, dir) };
    true
}

pub(crate) unsafe fn get_system_directory(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: forwarded registration contract.
    unsafe { write_dir(ctx, data, CoreDir::System) }
}

pub(crate) unsafe fn get_save_directory(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: forwarded registration contract.
    unsafe { write_dir(ctx, data, CoreDir::Save) }
}

pub(crate) unsafe fn get_core_assets_directory(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: forwarded registration contract.
    unsafe { write_dir(ctx, data, CoreDir::CoreAssets) }
}

pub(crate) unsafe fn get_libretro_path(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `const char **`; the string lives as long as the session.
    unsafe { write::<*const c_char>(data, ctx.core_path_c().as_ptr()) };
    true
}

pub(crate) unsafe fn get_username(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: as for `get_libretro_path`.
    unsafe { write::<*const c_char>(data, ctx.username_c().as_ptr()) };
    true
}

pub(crate) unsafe fn get_language(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: `retro_language` is an unsigned enum.
    unsafe { write::<c_uint>(data, ctx.config.language) };
    true
}

pub(crate) unsafe fn set_support_no_game(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `bool` per registration.
    let supported = unsafe { read::<bool>(data) };
    debug!(supported, "support no game");
    ctx.env.lock().support_no_game = supported;
    true
}

pub(crate) unsafe fn set_support_achievements(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `bool` per registration.
    let supported = unsafe { read::<bool>(data) };
    ctx.env.lock().supports_achievements = supported;
    true
}

pub(crate) unsafe fn set_memory_maps(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_memory_map` per registration.
    let map = unsafe { read::<retro_memory_map>(data) };
    debug!(descriptors = map.num_descriptors, "memory map");
    ctx.env.lock().memory_descriptors = map.num_descriptors as usize;
    true
}

pub(crate) unsafe fn get_audio_video_enable(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `int *` per registration.
    unsafe { write::<i32>(data, AUDIO_VIDEO_ENABLE_VIDEO | AUDIO_VIDEO_ENABLE_AUDIO) };
    true
}

pub(crate) unsafe fn get_fastforwarding(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `bool *` per registration.
    unsafe { write(data, false) };
    true
}

pub(crate) unsafe fn get_throttle_state(_ctx: &SessionContext, data: *mut c_void) -> bool {
    let state = retro_throttle_state {
        mode: THROTTLE_NONE,
        rate: 0.0,
    };
    // SAFETY: non-null `retro_throttle_state` per registration.
    unsafe { write(data, state) };
    true
}

pub(crate) unsafe fn get_message_interface_version(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `unsigned *` per registration.
    unsafe { write::<c_uint>(data, MESSAGE_INTERFACE_VERSION) };
    true
}

pub(crate) unsafe fn get_disk_control_interface_version(
    _ctx: &SessionContext,
    data: *mut c_void,
) -> bool {
    // SAFETY: non-null `unsigned *` per registration.
    unsafe { write::<c_uint>(data, DISK_CONTROL_INTERFACE_VERSION) };
    true
}

pub(crate) unsafe fn set_disk_control_interface(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_disk_control_callback` per registration.
    let callbacks = unsafe { read::<retro_disk_control_callback>(data) };
    debug!("disk control interface registered");
    ctx.env.lock().disk_control = Some(DiskControl::Basic(callbacks));
    true
}

pub(crate) unsafe fn set_disk_control_ext_interface(ctx: &SessionContext, data: *mut c_void) -> bool {
    let mut env = ctx.env.lock();
    if data.is_null() {
        env.disk_control = None;
        return true;
    }
    // SAFETY: non-null `retro_disk_control_ext_callback`.
    let callbacks = unsafe { read::<retro_disk_control_ext_callback>(data) };
    debug!("extended disk control interface registered");
    env.disk_control = Some(DiskControl::Extended(callbacks));
    true
}

pub(crate) unsafe fn set_frame_time_callback(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_frame_time_callback` per registration.
    let registration = unsafe { read::<retro_frame_time_callback>(data) };
    let mut env = ctx.env.lock();
    env.frame_time = registration.callback.map(|callback| FrameTimeCallback {
        callback,
        reference: registration.reference,
    });
    debug!(registered = env.frame_time.is_some(), reference = registration.reference, "frame time callback");
    true
}
