use std::ffi::{c_uint, c_void};

use rust_libretro_sys::retro_audio_buffer_status_callback;
use tracing::{debug, warn};

use super::read;
use crate::session::context::SessionContext;

/// Null unregisters; a struct with a null callback is rejected.
pub(crate) unsafe fn set_audio_buffer_status_callback(ctx: &SessionContext, data: *mut c_void) -> bool {
    let mut audio = ctx.audio.lock();
    if data.is_null() {
        debug!("audio buffer status callback unregistered");
        audio.clear_status_callback();
        return true;
    }
    // SAFETY: non-null `retro_audio_buffer_status_callback`.
    let registration = unsafe { read::<retro_audio_buffer_status_callback>(data) };
    if registration.callback.is_none() {
        warn!("audio buffer status registration without a callback");
        return false;
    }
    audio.set_status_callback(registration.callback);
    debug!("audio buffer status callback registered");
    true
}

pub(crate) unsafe fn set_minimum_audio_latency(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `unsigned` per registration.
    let latency_ms = unsafe { read::<c_uint>(data) };
    debug!(latency_ms, "minimum audio latency");
    ctx.audio.lock().set_minimum_latency(latency_ms);
    true
}
