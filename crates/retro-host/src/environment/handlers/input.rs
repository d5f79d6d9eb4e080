use std::ffi::c_void;

use rust_libretro_sys::{
    retro_controller_description, retro_controller_info, retro_input_descriptor,
    retro_keyboard_callback,
};
use tracing::{debug, warn};

use super::{MAX_TERMINATED_ENTRIES, read, terminated, write};
use crate::{
    environment::c_string,
    input::{ControllerType, DEVICE_CAPABILITIES, InputDescriptor, MAX_PORTS},
    session::context::SessionContext,
};

/// Replaces every previously registered descriptor.
pub(crate) unsafe fn set_input_descriptors(ctx: &SessionContext, data: *mut c_void) -> bool {
    let first = data.cast_const().cast::<retro_input_descriptor>();
    // SAFETY: the array ends with an entry whose description is null.
    let descriptors: Vec<InputDescriptor> =
        unsafe { terminated(first, MAX_TERMINATED_ENTRIES, |d| d.description.is_null()) }
            .map(|d| InputDescriptor {
                port: d.port,
                device: d.device,
                index: d.index,
                id: d.id,
                // SAFETY: checked non-null by the terminator.
                description: unsafe { c_string(d.description) }.unwrap_or_default(),
            })
            .collect();
    debug!(count = descriptors.len(), "input descriptors");
    ctx.input.replace_descriptors(descriptors);
    true
}

pub(crate) unsafe fn set_keyboard_callback(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_keyboard_callback` per registration.
    let registration = unsafe { read::<retro_keyboard_callback>(data) };
    if registration.callback.is_none() {
        warn!("keyboard registration without a callback");
        return false;
    }
    ctx.env.lock().keyboard_callback = registration.callback;
    debug!("keyboard callback registered");
    true
}

pub(crate) unsafe fn get_input_device_capabilities(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `uint64_t *` per registration.
    unsafe { write::<u64>(data, DEVICE_CAPABILITIES) };
    true
}

/// Bitmask queries are always answered; the payload is unused.
pub(crate) unsafe fn get_input_bitmasks(_ctx: &SessionContext, _data: *mut c_void) -> bool {
    true
}

/// One entry per port, terminated by a null type list. Descriptions without a
/// name are skipped. Null clears the registration.
pub(crate) unsafe fn set_controller_info(ctx: &SessionContext, data: *mut c_void) -> bool {
    let first = data.cast_const().cast::<retro_controller_info>();
    // SAFETY: the array ends with an entry whose type list is null.
    let controllers: Vec<Vec<ControllerType>> =
        unsafe { terminated(first, MAX_PORTS * 8, |info| info.types.is_null()) }
            .map(|info| {
                // SAFETY: `types` points at `num_types` descriptions.
                let types: &[retro_controller_description] =
                    unsafe { std::slice::from_raw_parts(info.types, info.num_types as usize) };
                types
                    .iter()
                    .filter_map(|desc| {
                        // SAFETY: descriptions are NUL-terminated strings owned by the core.
                        let name = unsafe { c_string(desc.desc) }?;
                        Some(ControllerType { name, id: desc.id })
                    })
                    .collect()
            })
            .collect();
    debug!(ports = controllers.len(), "controller info");
    ctx.input.replace_controllers(controllers);
    true
}
