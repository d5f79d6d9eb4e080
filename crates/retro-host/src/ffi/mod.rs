//! `extern "C"` entry points handed to the core.
//!
//! The ABI's callbacks carry no user pointer, so each trampoline recovers its
//! session from a thread-local installed by [`ContextScope`]. Bodies run under
//! `catch_unwind`; a panic is logged and answered with the neutral value.

pub(crate) mod log;
pub(crate) mod perf;
pub(crate) mod vfs;

use std::{
    cell::RefCell,
    ffi::{CStr, c_char, c_int, c_uint, c_void},
    panic::{AssertUnwindSafe, catch_unwind},
    slice,
    sync::Arc,
};

use rust_libretro_sys::{retro_proc_address_t, retro_rumble_effect};
use tracing::{debug, error, trace};

use crate::{
    host::GlContext,
    input::RumbleMotor,
    loader::Callbacks,
    session::context::SessionContext,
    video::{FrameSource, HW_FRAME_BUFFER_VALID},
};

thread_local! {
    static CURRENT: RefCell<Option<Arc<SessionContext>>> = const { RefCell::new(None) };
    static GL_CONTEXT: RefCell<Option<Box<dyn GlContext>>> = const { RefCell::new(None) };
}

/// Makes a session current on this thread until dropped.
pub(crate) struct ContextScope {
    previous: Option<Arc<SessionContext>>,
}

impl ContextScope {
    pub(crate) fn enter(context: Arc<SessionContext>) -> Self {
        let previous = CURRENT.with(|slot| slot.replace(Some(context)));
        Self { previous }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

pub(crate) fn current() -> Option<Arc<SessionContext>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Binds `context` to this thread's GL slot; any previous context is dropped.
pub(crate) fn install_gl_context(context: Box<dyn GlContext>) {
    GL_CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
}

pub(crate) fn take_gl_context() -> Option<Box<dyn GlContext>> {
    GL_CONTEXT.with(|slot| slot.borrow_mut().take())
}

fn with_gl<R>(f: impl FnOnce(&mut dyn GlContext) -> R) -> Option<R> {
    GL_CONTEXT.with(|slot| {
        let mut slot = slot.try_borrow_mut().ok()?;
        slot.as_mut().map(|gl| f(gl.as_mut()))
    })
}

/// Runs `f` and maps a panic to `default`.
pub(crate) fn guarded<R>(callback: &'static str, default: R, f: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!(callback, "panic inside core callback");
            default
        }
    }
}

/// Runs `f` against the current session, or returns `default` outside of one.
pub(crate) fn with_context<R>(
    callback: &'static str,
    default: R,
    f: impl FnOnce(&SessionContext) -> R,
) -> R {
    let Some(context) = current() else {
        debug!(callback, "core callback outside of a session");
        return default;
    };
    guarded(callback, default, || f(&context))
}

/// The callback set installed into every loaded core.
pub(crate) fn callbacks() -> Callbacks {
    Callbacks {
        environment: Some(environment),
        video_refresh: Some(video_refresh),
        audio_sample: Some(audio_sample),
        audio_sample_batch: Some(audio_sample_batch),
        input_poll: Some(input_poll),
        input_state: Some(input_state),
    }
}

unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    // SAFETY: `data` comes straight from the core, which owns its layout for `cmd`.
    with_context("environment", false, |ctx| unsafe {
        crate::environment::dispatch(ctx, cmd, data)
    })
}

unsafe extern "C" fn video_refresh(data: *const c_void, width: c_uint, height: c_uint, pitch: usize) {
    with_context("video_refresh", (), |ctx| {
        let mut video = ctx.video.lock();
        let command = if data.is_null() {
            video.on_refresh(FrameSource::Duplicate, width, height)
        } else if data == HW_FRAME_BUFFER_VALID {
            let command = with_gl(|gl| video.on_refresh(FrameSource::Hardware(gl), width, height));
            if command.is_none() {
                trace!("hardware frame without a bound GL context");
            }
            command.flatten()
        } else {
            let len = video
                .software_format()
                .required_len(width as usize, height as usize, pitch);
            // SAFETY: the core guarantees `height` rows of `pitch` bytes behind `data`.
            let bytes = unsafe { slice::from_raw_parts(data.cast::<u8>(), len) };
            video.on_refresh(
                FrameSource::Software { data: bytes, pitch },
                width,
                height,
            )
        };
        drop(video);
        if let Some(command) = command {
            ctx.commands.send(command);
        }
    })
}

unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    with_context("audio_sample", (), |ctx| ctx.audio.lock().on_sample(left, right))
}

unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    if data.is_null() {
        return frames;
    }
    with_context("audio_sample_batch", frames, |ctx| {
        // SAFETY: the core passes `frames` interleaved stereo frames.
        let samples = unsafe { slice::from_raw_parts(data, frames * 2) };
        ctx.audio.lock().on_sample_batch(samples)
    })
}

unsafe extern "C" fn input_poll() {}

unsafe extern "C" fn input_state(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16 {
    with_context("input_state", 0, |ctx| ctx.input.query(port, device, index, id))
}

/// Always the default framebuffer; no off-screen target is provided.
pub(crate) unsafe extern "C" fn hw_get_current_framebuffer() -> usize {
    0
}

pub(crate) unsafe extern "C" fn hw_get_proc_address(sym: *const c_char) -> retro_proc_address_t {
    if sym.is_null() {
        return None;
    }
    guarded("hw_get_proc_address", None, || {
        // SAFETY: the core passes a NUL-terminated symbol name.
        let name = unsafe { CStr::from_ptr(sym) };
        let address = with_gl(|gl| gl.proc_address(name)).unwrap_or(std::ptr::null());
        if address.is_null() {
            debug!(symbol = %name.to_string_lossy(), "GL symbol not found");
            return None;
        }
        // SAFETY: the GL loader returned the address of an entry point; the core casts it
        // back to the real signature before calling.
        Some(unsafe { std::mem::transmute::<*const c_void, unsafe extern "C" fn()>(address) })
    })
}

pub(crate) unsafe extern "C" fn set_rumble_state(
    port: c_uint,
    effect: retro_rumble_effect,
    strength: u16,
) -> bool {
    with_context("set_rumble_state", false, |ctx| {
        let motor = if effect == retro_rumble_effect::RETRO_RUMBLE_STRONG {
            RumbleMotor::Strong
        } else {
            RumbleMotor::Weak
        };
        debug!(port, ?motor, strength, "rumble");
        ctx.input.set_rumble(port, motor, strength)
    })
}

pub(crate) unsafe extern "C" fn set_led_state(led: c_int, state: c_int) {
    debug!(led, state, "led");
}

/// Installed for GET_CLEAR_ALL_THREAD_WAITS_CB; there are no waits to clear.
pub(crate) unsafe extern "C" fn clear_all_thread_waits(_cmd: c_uint, _data: *mut c_void) -> bool {
    true
}
