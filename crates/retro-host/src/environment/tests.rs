use std::{
    ffi::{CStr, c_char, c_uint},
    ptr,
};

use rust_libretro_sys::{
    retro_controller_description, retro_controller_info, retro_core_option_v2_category,
    retro_core_option_v2_definition, retro_core_option_value, retro_core_options_v2,
    retro_core_options_v2_intl, retro_hw_context_type, retro_hw_render_callback,
    retro_input_descriptor, retro_variable, retro_vfs_interface_info,
};
use tracing::Level;

use super::*;
use crate::{
    session::{SessionEvent, StopReason},
    test_util::{EventCounter, TestContext},
    video::PixelFormat,
};

fn call<T>(ctx: &SessionContext, cmd: u32, payload: &mut T) -> bool {
    // SAFETY: every test passes the payload type the command defines.
    unsafe { dispatch(ctx, cmd, (payload as *mut T).cast()) }
}

fn call_array<T>(ctx: &SessionContext, cmd: u32, items: &mut [T]) -> bool {
    // SAFETY: as for `call`; the array carries its own terminator.
    unsafe { dispatch(ctx, cmd, items.as_mut_ptr().cast()) }
}

fn call_null(ctx: &SessionContext, cmd: u32) -> bool {
    // SAFETY: null is always an acceptable pointer value.
    unsafe { dispatch(ctx, cmd, ptr::null_mut()) }
}

fn no_value() -> retro_core_option_value {
    retro_core_option_value {
        value: ptr::null(),
        label: ptr::null(),
    }
}

fn get_variable(ctx: &SessionContext, key: &CStr) -> Option<String> {
    let mut variable = retro_variable {
        key: key.as_ptr(),
        value: ptr::null(),
    };
    call(ctx, command::GET_VARIABLE, &mut variable).then(|| {
        // SAFETY: the dispatcher pointed `value` at a live option string.
        unsafe { CStr::from_ptr(variable.value) }
            .to_string_lossy()
            .into_owned()
    })
}

#[test]
fn unknown_command_logs_one_error_and_changes_nothing() {
    let t = TestContext::new("env-unknown");
    let before = t.ctx.options.lock().snapshot();
    let mut payload = 0u32;
    let counter = EventCounter::default();
    let handled = counter.run(|| call(&t.ctx, 0xDEAD_BEEF, &mut payload));
    assert!(!handled);
    assert_eq!(counter.count(Level::ERROR), 1);
    assert_eq!(counter.messages().len(), 1);
    assert_eq!(payload, 0);
    assert_eq!(t.ctx.options.lock().snapshot(), before);
    assert_eq!(t.ctx.video.lock().pixel_format(), None);
}

#[test]
fn declared_unimplemented_commands_warn_and_refuse() {
    let t = TestContext::new("env-unimplemented");
    let mut payload = 0u32;
    let counter = EventCounter::default();
    let handled = counter.run(|| call(&t.ctx, command::GET_SENSOR_INTERFACE, &mut payload));
    assert!(!handled);
    assert_eq!(counter.count(Level::WARN), 1);
    assert_eq!(counter.count(Level::ERROR), 0);
}

#[test]
fn required_payloads_are_checked_before_the_handler_runs() {
    let t = TestContext::new("env-null");
    let counter = EventCounter::default();
    counter.run(|| {
        assert!(!call_null(&t.ctx, command::GET_CAN_DUPE));
        assert!(!call_null(&t.ctx, command::SET_PIXEL_FORMAT));
        assert!(!call_null(&t.ctx, command::GET_VARIABLE));
        assert!(!call_null(&t.ctx, command::SET_INPUT_DESCRIPTORS));
    });
    assert_eq!(counter.count(Level::WARN), 4);
}

#[test]
fn every_declared_command_is_registered() {
    for &(code, name) in command::ALL {
        assert!(REGISTRY.is_known(code), "{name} missing from the table");
    }
    assert!(REGISTRY.has_handler(command::GET_CAN_DUPE));
    assert!(!REGISTRY.has_handler(command::SET_AUDIO_CALLBACK));
}

#[test]
fn fixed_answers() {
    let t = TestContext::new("env-fixed");
    let mut flag = false;
    assert!(call(&t.ctx, command::GET_CAN_DUPE, &mut flag));
    assert!(flag);
    flag = true;
    assert!(call(&t.ctx, command::GET_OVERSCAN, &mut flag));
    assert!(!flag);
    flag = true;
    assert!(call(&t.ctx, command::GET_FASTFORWARDING, &mut flag));
    assert!(!flag);

    let mut enable = 0i32;
    assert!(call(&t.ctx, command::GET_AUDIO_VIDEO_ENABLE, &mut enable));
    assert_eq!(enable, 3);

    let mut version: c_uint = 0;
    assert!(call(&t.ctx, command::GET_CORE_OPTIONS_VERSION, &mut version));
    assert_eq!(version, 2);
    assert!(call(&t.ctx, command::GET_MESSAGE_INTERFACE_VERSION, &mut version));
    assert_eq!(version, 1);
    assert!(call(&t.ctx, command::GET_PREFERRED_HW_RENDER, &mut version));
    assert_eq!(version, retro_hw_context_type::RETRO_HW_CONTEXT_OPENGL_CORE as c_uint);

    let mut caps = 0u64;
    assert!(call(&t.ctx, command::GET_INPUT_DEVICE_CAPABILITIES, &mut caps));
    assert_eq!(caps, crate::input::DEVICE_CAPABILITIES);
    assert!(call_null(&t.ctx, command::GET_INPUT_BITMASKS));
}

#[test]
fn pixel_format_accepts_only_the_three_encodings() {
    let t = TestContext::new("env-pixel");
    let mut raw = 2u32;
    assert!(call(&t.ctx, command::SET_PIXEL_FORMAT, &mut raw));
    assert_eq!(t.ctx.video.lock().pixel_format(), Some(PixelFormat::Rgb565));
    raw = 7;
    assert!(!call(&t.ctx, command::SET_PIXEL_FORMAT, &mut raw));
    raw = crate::video::RAW_PIXEL_FORMAT_UNKNOWN;
    assert!(!call(&t.ctx, command::SET_PIXEL_FORMAT, &mut raw));
    assert_eq!(t.ctx.video.lock().pixel_format(), Some(PixelFormat::Rgb565));
}

#[test]
fn legacy_variables_then_host_change_is_delivered_once() {
    let t = TestContext::new("env-vars");
    let mut vars = [
        retro_variable {
            key: c"fake_difficulty".as_ptr(),
            value: c"Difficulty; easy|hard".as_ptr(),
        },
        retro_variable {
            key: c"fake_lives".as_ptr(),
            value: c"Lives; 1|3|5".as_ptr(),
        },
        retro_variable {
            key: ptr::null(),
            value: ptr::null(),
        },
    ];
    assert!(call_array(&t.ctx, command::SET_VARIABLES, &mut vars));
    assert_eq!(get_variable(&t.ctx, c"fake_difficulty").as_deref(), Some("easy"));
    assert_eq!(get_variable(&t.ctx, c"fake_lives").as_deref(), Some("1"));
    assert_eq!(get_variable(&t.ctx, c"fake_missing"), None);

    let mut updated = true;
    assert!(call(&t.ctx, command::GET_VARIABLE_UPDATE, &mut updated));
    assert!(!updated);

    assert!(t.ctx.options.lock().set("fake_lives", "5"));
    assert!(call(&t.ctx, command::GET_VARIABLE_UPDATE, &mut updated));
    assert!(updated);
    assert!(call(&t.ctx, command::GET_VARIABLE_UPDATE, &mut updated));
    assert!(!updated);
    assert_eq!(get_variable(&t.ctx, c"fake_lives").as_deref(), Some("5"));
}

#[test]
fn queried_values_survive_host_changes_and_reregistration() {
    let t = TestContext::new("env-var-lifetime");
    let mut vars = [
        retro_variable {
            key: c"fake_speed".as_ptr(),
            value: c"Speed; slow|fast".as_ptr(),
        },
        retro_variable {
            key: ptr::null(),
            value: ptr::null(),
        },
    ];
    assert!(call_array(&t.ctx, command::SET_VARIABLES, &mut vars));
    let mut query = retro_variable {
        key: c"fake_speed".as_ptr(),
        value: ptr::null(),
    };
    assert!(call(&t.ctx, command::GET_VARIABLE, &mut query));
    let held = query.value;

    assert!(t.ctx.options.lock().set("fake_speed", "fast"));
    // SAFETY: replaced values stay allocated until the context is dropped.
    assert_eq!(unsafe { CStr::from_ptr(held) }, c"slow");
    assert_eq!(get_variable(&t.ctx, c"fake_speed").as_deref(), Some("fast"));

    assert!(call(&t.ctx, command::GET_VARIABLE, &mut query));
    let second = query.value;
    assert!(call_array(&t.ctx, command::SET_VARIABLES, &mut vars));
    // SAFETY: as above.
    assert_eq!(unsafe { CStr::from_ptr(second) }, c"fast");
    assert_eq!(unsafe { CStr::from_ptr(held) }, c"slow");
}

#[test]
fn core_side_set_variable_rejects_unknown_keys() {
    let t = TestContext::new("env-setvar");
    let mut vars = [
        retro_variable {
            key: c"fake_mode".as_ptr(),
            value: c"Mode; a|b".as_ptr(),
        },
        retro_variable {
            key: ptr::null(),
            value: ptr::null(),
        },
    ];
    assert!(call_array(&t.ctx, command::SET_VARIABLES, &mut vars));
    assert!(call_null(&t.ctx, command::SET_VARIABLE));

    let mut change = retro_variable {
        key: c"fake_mode".as_ptr(),
        value: c"b".as_ptr(),
    };
    assert!(call(&t.ctx, command::SET_VARIABLE, &mut change));
    assert_eq!(get_variable(&t.ctx, c"fake_mode").as_deref(), Some("b"));

    change.key = c"fake_other".as_ptr();
    assert!(!call(&t.ctx, command::SET_VARIABLE, &mut change));
}

#[test]
fn v2_intl_prefers_the_localized_table() {
    let t = TestContext::new("env-v2");
    let mut categories = [
        retro_core_option_v2_category {
            key: c"video".as_ptr(),
            desc: c"Video".as_ptr(),
            info: ptr::null(),
        },
        retro_core_option_v2_category {
            key: ptr::null(),
            desc: ptr::null(),
            info: ptr::null(),
        },
    ];
    let definition = |key: *const c_char, default: *const c_char| {
        let mut values = [no_value(); 128];
        values[0].value = c"off".as_ptr();
        values[1].value = c"on".as_ptr();
        values[1].label = c"Enabled".as_ptr();
        retro_core_option_v2_definition {
            key,
            desc: c"Filter".as_ptr(),
            desc_categorized: ptr::null(),
            info: ptr::null(),
            info_categorized: ptr::null(),
            category_key: c"video".as_ptr(),
            values,
            default_value: default,
        }
    };
    let mut us_defs = [definition(c"fake_us".as_ptr(), c"on".as_ptr()), definition(ptr::null(), ptr::null())];
    let mut local_defs = [
        definition(c"fake_local".as_ptr(), ptr::null()),
        definition(ptr::null(), ptr::null()),
    ];
    let mut us = retro_core_options_v2 {
        categories: categories.as_mut_ptr(),
        definitions: us_defs.as_mut_ptr(),
    };
    let mut local = retro_core_options_v2 {
        categories: categories.as_mut_ptr(),
        definitions: local_defs.as_mut_ptr(),
    };
    let mut intl = retro_core_options_v2_intl {
        us: &mut us,
        local: &mut local,
    };
    assert!(call(&t.ctx, command::SET_CORE_OPTIONS_V2_INTL, &mut intl));

    let snapshot = t.ctx.options.lock().snapshot();
    assert_eq!(snapshot.categories.len(), 1);
    assert_eq!(snapshot.definitions.len(), 1);
    let def = &snapshot.definitions[0];
    assert_eq!(def.key, "fake_local");
    assert_eq!(def.category.as_deref(), Some("video"));
    assert_eq!(def.values[1].label.as_deref(), Some("Enabled"));
    // No declared default: the first value.
    assert_eq!(get_variable(&t.ctx, c"fake_local").as_deref(), Some("off"));
    assert_eq!(get_variable(&t.ctx, c"fake_us"), None);

    intl.local = ptr::null_mut();
    assert!(call(&t.ctx, command::SET_CORE_OPTIONS_V2_INTL, &mut intl));
    assert_eq!(get_variable(&t.ctx, c"fake_us").as_deref(), Some("on"));
}

unsafe extern "C" fn fake_context_reset() {}

#[test]
fn hw_render_is_recorded_and_filled_in() {
    let t = TestContext::new("env-hw");
    // SAFETY: all-zero is a valid bit pattern for this plain C struct (null fn pointers,
    // false flags, OPENGL_NONE).
    let mut hw: retro_hw_render_callback = unsafe { std::mem::zeroed() };
    hw.context_type = retro_hw_context_type::RETRO_HW_CONTEXT_OPENGL_CORE;
    hw.context_reset = Some(fake_context_reset);
    hw.version_major = 3;
    hw.version_minor = 3;
    hw.depth = true;
    assert!(call(&t.ctx, command::SET_HW_RENDER, &mut hw));
    assert!(hw.get_current_framebuffer.is_some());
    assert!(hw.get_proc_address.is_some());

    let video = t.ctx.video.lock();
    let render = video.hw_render().expect("hw render recorded");
    assert_eq!(render.request.profile, crate::host::GlProfile::Core);
    assert_eq!((render.request.version_major, render.request.version_minor), (3, 3));
    assert!(render.request.depth);
    assert!(video.needs_gl_context());
}

#[test]
fn hw_render_rejects_non_gl_contexts() {
    let t = TestContext::new("env-hw-vk");
    // SAFETY: see `hw_render_is_recorded_and_filled_in`.
    let mut hw: retro_hw_render_callback = unsafe { std::mem::zeroed() };
    hw.context_type = retro_hw_context_type::RETRO_HW_CONTEXT_VULKAN;
    hw.context_reset = Some(fake_context_reset);
    assert!(!call(&t.ctx, command::SET_HW_RENDER, &mut hw));
    assert!(hw.get_proc_address.is_none());
    assert!(t.ctx.video.lock().hw_render().is_none());
}

#[test]
fn descriptors_and_controllers_replace_previous_registrations() {
    let t = TestContext::new("env-input");
    let mut descriptors = [
        retro_input_descriptor {
            port: 0,
            device: 1,
            index: 0,
            id: 8,
            description: c"A".as_ptr(),
        },
        retro_input_descriptor {
            port: 0,
            device: 0,
            index: 0,
            id: 0,
            description: ptr::null(),
        },
    ];
    assert!(call_array(&t.ctx, command::SET_INPUT_DESCRIPTORS, &mut descriptors));
    assert_eq!(t.ctx.input.descriptors().len(), 1);
    assert_eq!(t.ctx.input.descriptors()[0].description, "A");

    let types = [
        retro_controller_description {
            desc: c"Gamepad".as_ptr(),
            id: 1,
        },
        retro_controller_description {
            desc: ptr::null(),
            id: 2,
        },
        retro_controller_description {
            desc: c"Mouse".as_ptr(),
            id: 2,
        },
    ];
    let mut info = [
        retro_controller_info {
            types: types.as_ptr(),
            num_types: 3,
        },
        retro_controller_info {
            types: ptr::null(),
            num_types: 0,
        },
    ];
    assert!(call_array(&t.ctx, command::SET_CONTROLLER_INFO, &mut info));
    let controllers = t.ctx.input.controllers();
    assert_eq!(controllers.len(), 1);
    let names: Vec<&str> = controllers[0].iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Gamepad", "Mouse"]);

    assert!(call_null(&t.ctx, command::SET_CONTROLLER_INFO));
    assert!(t.ctx.input.controllers().is_empty());
}

#[test]
fn directories_are_created_on_first_request() {
    let t = TestContext::new("env-dirs");
    let mut dir: *const c_char = ptr::null();
    assert!(call(&t.ctx, command::GET_SAVE_DIRECTORY, &mut dir));
    // SAFETY: the dispatcher wrote a session-owned C string.
    let path = unsafe { CStr::from_ptr(dir) }.to_string_lossy().into_owned();
    assert!(std::path::Path::new(&path).is_dir());
    assert!(path.ends_with("fake"));

    let mut again: *const c_char = ptr::null();
    assert!(call(&t.ctx, command::GET_SAVE_DIRECTORY, &mut again));
    assert_eq!(dir, again);

    let mut libretro_path: *const c_char = ptr::null();
    assert!(call(&t.ctx, command::GET_LIBRETRO_PATH, &mut libretro_path));
    // SAFETY: as above.
    let libretro_path = unsafe { CStr::from_ptr(libretro_path) }.to_string_lossy().into_owned();
    assert!(libretro_path.ends_with("fake_libretro.so"));
    assert!(t.dir.path().exists());
}

#[test]
fn shutdown_and_messages_reach_the_host() {
    let t = TestContext::new("env-shutdown");
    let mut message = rust_libretro_sys::retro_message {
        msg: c"Saved".as_ptr(),
        frames: 120,
    };
    assert!(call(&t.ctx, command::SET_MESSAGE, &mut message));
    assert_eq!(
        t.events.try_recv().ok(),
        Some(SessionEvent::Message {
            text: "Saved".into(),
            frames: 120
        })
    );

    t.ctx.running.store(true, std::sync::atomic::Ordering::Release);
    assert!(call_null(&t.ctx, command::SHUTDOWN));
    assert!(!t.ctx.is_running());
    assert_eq!(t.ctx.stop_reason(), Some(StopReason::CoreShutdown));
}

unsafe extern "C" fn fake_status(_active: bool, _occupancy: c_uint, _underrun: bool) {}

#[test]
fn audio_status_callback_registration() {
    let t = TestContext::new("env-audio");
    let mut registration = rust_libretro_sys::retro_audio_buffer_status_callback {
        callback: Some(fake_status),
    };
    assert!(call(&t.ctx, command::SET_AUDIO_BUFFER_STATUS_CALLBACK, &mut registration));
    assert!(t.ctx.audio.lock().pending_status().is_some());

    assert!(call_null(&t.ctx, command::SET_AUDIO_BUFFER_STATUS_CALLBACK));
    assert!(t.ctx.audio.lock().pending_status().is_none());

    registration.callback = None;
    assert!(!call(&t.ctx, command::SET_AUDIO_BUFFER_STATUS_CALLBACK, &mut registration));

    let mut latency: c_uint = 64;
    assert!(call(&t.ctx, command::SET_MINIMUM_AUDIO_LATENCY, &mut latency));
    assert_eq!(t.ctx.audio.lock().minimum_latency_ms(), 64);
}

#[test]
fn vfs_versions_above_three_are_refused() {
    let t = TestContext::new("env-vfs");
    let mut info = retro_vfs_interface_info {
        required_interface_version: 4,
        iface: ptr::null_mut(),
    };
    assert!(!call(&t.ctx, command::GET_VFS_INTERFACE, &mut info));
    assert!(info.iface.is_null());

    info.required_interface_version = 2;
    assert!(call(&t.ctx, command::GET_VFS_INTERFACE, &mut info));
    assert!(!info.iface.is_null());
    assert_eq!(info.required_interface_version, 3);
}
