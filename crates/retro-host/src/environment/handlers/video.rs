use std::{
    ffi::{c_uint, c_void},
    ptr::{addr_of, addr_of_mut},
};

use rust_libretro_sys::{retro_game_geometry, retro_hw_render_callback, retro_system_av_info};
use tracing::{info, warn};

use super::{read, write};
use crate::{
    ffi::{hw_get_current_framebuffer, hw_get_proc_address},
    host::GlRequest,
    session::context::SessionContext,
    video::{HwRender, PREFERRED_HW_CONTEXT, gl_profile_from_raw},
};

pub(crate) unsafe fn set_rotation(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `unsigned` per registration.
    let rotation = unsafe { read::<c_uint>(data) };
    if rotation > 3 {
        warn!(rotation, "invalid rotation");
        return false;
    }
    ctx.video.lock().set_rotation(rotation);
    true
}

pub(crate) unsafe fn get_overscan(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `bool *` per registration.
    unsafe { write(data, false) };
    true
}

pub(crate) unsafe fn get_can_dupe(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `bool *` per registration.
    unsafe { write(data, true) };
    true
}

pub(crate) unsafe fn set_pixel_format(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: `retro_pixel_format` is read as its raw representation.
    let raw = unsafe { read::<u32>(data) };
    ctx.video.lock().set_pixel_format(raw)
}

pub(crate) unsafe fn set_hw_render(ctx: &SessionContext, data: *mut c_void) -> bool {
    let hw = data.cast::<retro_hw_render_callback>();
    // SAFETY: non-null `retro_hw_render_callback` per registration; the enum field is
    // read as its raw representation.
    let context_type = unsafe { addr_of!((*hw).context_type).cast::<u32>().read() };
    let Some(profile) = gl_profile_from_raw(context_type) else {
        warn!(context_type, "unsupported hardware context type");
        return false;
    };
    // SAFETY: as above; every remaining field is a plain value or optional fn pointer.
    let render = unsafe {
        HwRender {
            request: GlRequest {
                profile,
                version_major: addr_of!((*hw).version_major).read(),
                version_minor: addr_of!((*hw).version_minor).read(),
                depth: addr_of!((*hw).depth).read(),
                stencil: addr_of!((*hw).stencil).read(),
                bottom_left_origin: addr_of!((*hw).bottom_left_origin).read(),
            },
            context_reset: addr_of!((*hw).context_reset).read(),
            context_destroy: addr_of!((*hw).context_destroy).read(),
        }
    };
    // SAFETY: the core expects the frontend to fill these two fields in.
    unsafe {
        addr_of_mut!((*hw).get_current_framebuffer).write(Some(hw_get_current_framebuffer));
        addr_of_mut!((*hw).get_proc_address).write(Some(hw_get_proc_address));
    }
    ctx.video.lock().set_hw_render(render);
    true
}

pub(crate) unsafe fn get_preferred_hw_render(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: `retro_hw_context_type *` written as its raw representation.
    unsafe { write::<u32>(data, PREFERRED_HW_CONTEXT) };
    true
}

pub(crate) unsafe fn set_geometry(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_game_geometry` per registration.
    let geometry = unsafe { read::<retro_game_geometry>(data) };
    info!(
        width = geometry.base_width,
        height = geometry.base_height,
        aspect = geometry.aspect_ratio,
        "geometry changed"
    );
    ctx.video
        .lock()
        .update_geometry(geometry.base_width, geometry.base_height, geometry.aspect_ratio);
    true
}

/// Logged only; pacing keeps the timing queried after load.
pub(crate) unsafe fn set_system_av_info(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_system_av_info` per registration.
    let av = unsafe { read::<retro_system_av_info>(data) };
    info!(
        fps = av.timing.fps,
        sample_rate = av.timing.sample_rate,
        width = av.geometry.base_width,
        height = av.geometry.base_height,
        "core announced new AV info"
    );
    true
}
