//! Environment command dispatch.
//!
//! Every command the frontend knows is registered in one table: either with a
//! handler and the payload contract it expects, or as declared-unimplemented.
//! Codes missing from the table are unknown.

pub mod command;
mod handlers;

use std::{
    collections::HashMap,
    ffi::{CStr, c_char, c_void},
};

use once_cell::sync::Lazy;
use rust_libretro_sys::{
    retro_core_options_update_display_callback_t, retro_disk_control_callback,
    retro_disk_control_ext_callback, retro_keyboard_event_t, retro_usec_t,
};
use tracing::{error, trace, warn};

use crate::session::context::SessionContext;

/// Handler signature: the session and the raw payload pointer.
///
/// # Safety
/// `data` must be null or point at the payload layout the command defines.
pub(crate) type Handler = unsafe fn(&SessionContext, *mut c_void) -> bool;

/// Whether a null payload is rejected before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Payload {
    Required,
    /// The handler gives null its own meaning (usually "unregister").
    Optional,
}

#[derive(Clone, Copy)]
enum Entry {
    Handle { payload: Payload, handler: Handler },
    Unimplemented,
}

/// Registry mapping command codes to handlers.
pub(crate) struct EnvironmentRegistry {
    entries: HashMap<u32, Entry>,
}

impl EnvironmentRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub(crate) fn register(&mut self, cmd: u32, payload: Payload, handler: Handler) {
        self.entries.insert(cmd, Entry::Handle { payload, handler });
    }

    /// Declares a known command the frontend answers with `false`.
    pub(crate) fn unimplemented(&mut self, cmd: u32) {
        self.entries.insert(cmd, Entry::Unimplemented);
    }

    pub(crate) fn has_handler(&self, cmd: u32) -> bool {
        matches!(self.entries.get(&cmd), Some(Entry::Handle { .. }))
    }

    pub(crate) fn is_known(&self, cmd: u32) -> bool {
        self.entries.contains_key(&cmd)
    }

    /// Routes one environment call.
    ///
    /// # Safety
    /// See [`Handler`].
    pub(crate) unsafe fn dispatch(&self, ctx: &SessionContext, cmd: u32, data: *mut c_void) -> bool {
        let name = command::name(cmd).unwrap_or("?");
        match self.entries.get(&cmd) {
            None => {
                error!(cmd, "unknown environment command");
                false
            }
            Some(Entry::Unimplemented) => {
                warn!(cmd, name, "environment command not implemented");
                false
            }
            Some(Entry::Handle { payload, .. }) if *payload == Payload::Required && data.is_null() => {
                warn!(cmd, name, "environment command without payload");
                false
            }
            Some(Entry::Handle { handler, .. }) => {
                // SAFETY: forwarded caller contract.
                let handled = unsafe { handler(ctx, data) };
                trace!(cmd, name, handled, "environment");
                handled
            }
        }
    }
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a registry from `CODE => Payload handler` pairs and a list of
/// declared-unimplemented codes.
macro_rules! environment_table {
    (
        handled { $($code:ident => $payload:ident $handler:path,)* }
        unimplemented { $($missing:ident,)* }
    ) => {{
        let mut registry = $crate::environment::EnvironmentRegistry::new();
        $(
            registry.register(
                $crate::environment::command::$code,
                $crate::environment::Payload::$payload,
                $handler,
            );
        )*
        $(registry.unimplemented($crate::environment::command::$missing);)*
        registry
    }};
}

static REGISTRY: Lazy<EnvironmentRegistry> = Lazy::new(|| {
    use handlers::{audio, input, interfaces, options, system, video};
    environment_table! {
        handled {
            SET_ROTATION => Required video::set_rotation,
            GET_OVERSCAN => Required video::get_overscan,
            GET_CAN_DUPE => Required video::get_can_dupe,
            SET_MESSAGE => Required system::set_message,
            SHUTDOWN => Optional system::shutdown,
            SET_PERFORMANCE_LEVEL => Required system::set_performance_level,
            GET_SYSTEM_DIRECTORY => Required system::get_system_directory,
            SET_PIXEL_FORMAT => Required video::set_pixel_format,
            SET_INPUT_DESCRIPTORS => Required input::set_input_descriptors,
            SET_KEYBOARD_CALLBACK => Required input::set_keyboard_callback,
            SET_DISK_CONTROL_INTERFACE => Required system::set_disk_control_interface,
            SET_HW_RENDER => Required video::set_hw_render,
            GET_VARIABLE => Required options::get_variable,
            SET_VARIABLES => Required options::set_variables,
            GET_VARIABLE_UPDATE => Required options::get_variable_update,
            SET_SUPPORT_NO_GAME => Required system::set_support_no_game,
            GET_LIBRETRO_PATH => Required system::get_libretro_path,
            SET_FRAME_TIME_CALLBACK => Required system::set_frame_time_callback,
            GET_RUMBLE_INTERFACE => Required interfaces::get_rumble_interface,
            GET_INPUT_DEVICE_CAPABILITIES => Required input::get_input_device_capabilities,
            GET_LOG_INTERFACE => Required interfaces::get_log_interface,
            GET_PERF_INTERFACE => Required interfaces::get_perf_interface,
            GET_CORE_ASSETS_DIRECTORY => Required system::get_core_assets_directory,
            GET_SAVE_DIRECTORY => Required system::get_save_directory,
            SET_SYSTEM_AV_INFO => Required video::set_system_av_info,
            SET_CONTROLLER_INFO => Optional input::set_controller_info,
            SET_MEMORY_MAPS => Required system::set_memory_maps,
            SET_GEOMETRY => Required video::set_geometry,
            GET_USERNAME => Required system::get_username,
            GET_LANGUAGE => Required system::get_language,
            SET_SUPPORT_ACHIEVEMENTS => Required system::set_support_achievements,
            GET_VFS_INTERFACE => Required interfaces::get_vfs_interface,
            GET_LED_INTERFACE => Required interfaces::get_led_interface,
            GET_AUDIO_VIDEO_ENABLE => Required system::get_audio_video_enable,
            GET_FASTFORWARDING => Required system::get_fastforwarding,
            GET_INPUT_BITMASKS => Optional input::get_input_bitmasks,
            GET_CORE_OPTIONS_VERSION => Required options::get_core_options_version,
            SET_CORE_OPTIONS => Required options::set_core_options,
            SET_CORE_OPTIONS_INTL => Required options::set_core_options_intl,
            SET_CORE_OPTIONS_DISPLAY => Required options::set_core_options_display,
            GET_PREFERRED_HW_RENDER => Required video::get_preferred_hw_render,
            GET_DISK_CONTROL_INTERFACE_VERSION => Required system::get_disk_control_interface_version,
            SET_DISK_CONTROL_EXT_INTERFACE => Optional system::set_disk_control_ext_interface,
            GET_MESSAGE_INTERFACE_VERSION => Required system::get_message_interface_version,
            SET_MESSAGE_EXT => Required system::set_message_ext,
            SET_AUDIO_BUFFER_STATUS_CALLBACK => Optional audio::set_audio_buffer_status_callback,
            SET_MINIMUM_AUDIO_LATENCY => Required audio::set_minimum_audio_latency,
            SET_CORE_OPTIONS_V2 => Required options::set_core_options_v2,
            SET_CORE_OPTIONS_V2_INTL => Required options::set_core_options_v2_intl,
            SET_CORE_OPTIONS_UPDATE_DISPLAY_CALLBACK => Optional options::set_update_display_callback,
            SET_VARIABLE => Optional options::set_variable,
            GET_THROTTLE_STATE => Required system::get_throttle_state,
            GET_CLEAR_ALL_THREAD_WAITS_CB => Required interfaces::get_clear_all_thread_waits_cb,
        }
        unimplemented {
            SET_AUDIO_CALLBACK,
            GET_SENSOR_INTERFACE,
            GET_CAMERA_INTERFACE,
            GET_LOCATION_INTERFACE,
            SET_PROC_ADDRESS_CALLBACK,
            SET_SUBSYSTEM_INFO,
            GET_CURRENT_SOFTWARE_FRAMEBUFFER,
            GET_HW_RENDER_INTERFACE,
            SET_HW_RENDER_CONTEXT_NEGOTIATION_INTERFACE,
            SET_SERIALIZATION_QUIRKS,
            SET_HW_SHARED_CONTEXT,
            GET_MIDI_INTERFACE,
            GET_TARGET_REFRESH_RATE,
            GET_INPUT_MAX_USERS,
            SET_FASTFORWARDING_OVERRIDE,
            SET_CONTENT_INFO_OVERRIDE,
            GET_GAME_INFO_EXT,
            GET_SAVESTATE_CONTEXT,
            GET_HW_RENDER_CONTEXT_NEGOTIATION_INTERFACE_SUPPORT,
            GET_JIT_CAPABLE,
            GET_MICROPHONE_INTERFACE,
            GET_DEVICE_POWER,
            SET_NETPACKET_INTERFACE,
            GET_PLAYLIST_DIRECTORY,
            GET_FILE_BROWSER_START_DIRECTORY,
            SET_SAVE_STATE_IN_BACKGROUND,
            POLL_TYPE_OVERRIDE,
        }
    }
});

/// Entry point used by the environment trampoline.
///
/// # Safety
/// `data` must be null or point at the payload layout `cmd` defines.
pub(crate) unsafe fn dispatch(ctx: &SessionContext, cmd: u32, data: *mut c_void) -> bool {
    // SAFETY: forwarded caller contract.
    unsafe { REGISTRY.dispatch(ctx, cmd, data) }
}

/// Disk control callbacks the core registered.
#[derive(Clone, Copy)]
pub enum DiskControl {
    Basic(retro_disk_control_callback),
    Extended(retro_disk_control_ext_callback),
}

/// SET_FRAME_TIME_CALLBACK registration.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimeCallback {
    pub callback: unsafe extern "C" fn(retro_usec_t),
    /// Frame time reported on the first frame.
    pub reference: retro_usec_t,
}

/// Everything the core declared through the environment that no other
/// component owns.
#[derive(Default)]
pub struct EnvironmentState {
    pub performance_level: u32,
    pub support_no_game: bool,
    pub supports_achievements: bool,
    pub memory_descriptors: usize,
    pub keyboard_callback: retro_keyboard_event_t,
    pub disk_control: Option<DiskControl>,
    pub frame_time: Option<FrameTimeCallback>,
    pub update_display: retro_core_options_update_display_callback_t,
    /// Frame rate used to turn message durations into frame counts.
    pub fps: Option<f64>,
}

/// Borrowed view of a core-owned C string; `None` for null.
///
/// # Safety
/// `ptr` must be null or NUL-terminated and outlive `'a`.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: caller contract.
        Some(unsafe { CStr::from_ptr(ptr) })
    }
}

/// Owned copy of a core-owned C string; `None` for null.
///
/// # Safety
/// Same as [`c_str`].
pub(crate) unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    // SAFETY: caller contract.
    unsafe { c_str(ptr) }.map(|s| s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests;
