//! Capability structures filled with frontend function pointers.

use std::ffi::c_void;

use rust_libretro_sys::{
    retro_environment_t, retro_led_interface, retro_log_callback, retro_perf_callback,
    retro_rumble_interface, retro_vfs_interface, retro_vfs_interface_info,
};
use tracing::{debug, warn};

use super::write;
use crate::{
    ffi::{
        clear_all_thread_waits, log::log_callback, perf::perf_callback, set_led_state,
        set_rumble_state,
        vfs::{VFS_INTERFACE, VFS_VERSION},
    },
    session::context::SessionContext,
};

pub(crate) unsafe fn get_log_interface(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_log_callback *` per registration.
    unsafe { write::<retro_log_callback>(data, log_callback()) };
    true
}

pub(crate) unsafe fn get_perf_interface(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_perf_callback *` per registration.
    unsafe { write::<retro_perf_callback>(data, perf_callback()) };
    true
}

pub(crate) unsafe fn get_rumble_interface(_ctx: &SessionContext, data: *mut c_void) -> bool {
    let iface = retro_rumble_interface {
        set_rumble_state: Some(set_rumble_state),
    };
    // SAFETY: non-null `retro_rumble_interface *` per registration.
    unsafe { write(data, iface) };
    true
}

pub(crate) unsafe fn get_led_interface(_ctx: &SessionContext, data: *mut c_void) -> bool {
    let iface = retro_led_interface {
        set_led_state: Some(set_led_state),
    };
    // SAFETY: non-null `retro_led_interface *` per registration.
    unsafe { write(data, iface) };
    true
}

/// Answers any requested version up to [`VFS_VERSION`] with the v3 table.
pub(crate) unsafe fn get_vfs_interface(_ctx: &SessionContext, data: *mut c_void) -> bool {
    let info = data.cast::<retro_vfs_interface_info>();
    // SAFETY: non-null `retro_vfs_interface_info *` per registration.
    let requested = unsafe { (*info).required_interface_version };
    if requested > VFS_VERSION {
        warn!(requested, supported = VFS_VERSION, "unsupported VFS version");
        return false;
    }
    // SAFETY: as above. The table is immutable; the ABI types the field as mutable.
    unsafe {
        (*info).required_interface_version = VFS_VERSION;
        (*info).iface = &VFS_INTERFACE as *const retro_vfs_interface as *mut retro_vfs_interface;
    }
    debug!(requested, "VFS interface handed out");
    true
}

pub(crate) unsafe fn get_clear_all_thread_waits_cb(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: the payload is a `retro_environment_t *`.
    unsafe { write::<retro_environment_t>(data, Some(clear_all_thread_waits)) };
    true
}
