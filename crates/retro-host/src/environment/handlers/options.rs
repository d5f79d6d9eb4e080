//! Core option registration in all its ABI generations, plus value access.

use std::ffi::{c_char, c_uint, c_void};

use rust_libretro_sys::{
    retro_core_option_definition, retro_core_option_display,
    retro_core_option_v2_category, retro_core_option_v2_definition, retro_core_option_value,
    retro_core_options_intl, retro_core_options_update_display_callback, retro_core_options_v2,
    retro_core_options_v2_intl, retro_variable,
};
use tracing::{debug, warn};

use super::{MAX_TERMINATED_ENTRIES, read, terminated, write};
use crate::{
    environment::{c_str, c_string},
    options::{OptionCategory, OptionDefinition, OptionValue},
    session::context::SessionContext,
};

const CORE_OPTIONS_VERSION: c_uint = 2;

pub(crate) unsafe fn get_variable(ctx: &SessionContext, data: *mut c_void) -> bool {
    let variable = data.cast::<retro_variable>();
    // SAFETY: non-null `retro_variable` per registration.
    let key = unsafe { (*variable).key };
    // SAFETY: the key is a NUL-terminated string owned by the core.
    let Some(key) = (unsafe { c_str(key) }) else {
        return false;
    };
    let key = key.to_string_lossy();
    let options = ctx.options.lock();
    let Some(value) = options.get(&key) else {
        debug!(key = %key, "unknown option requested");
        return false;
    };
    // SAFETY: as above. Replaced values are retained until the session ends.
    unsafe { (*variable).value = value.as_ptr() };
    true
}

pub(crate) unsafe fn get_variable_update(ctx: &SessionContext, data: *mut c_void) -> bool {
    let updated = ctx.options.lock().take_update();
    // SAFETY: non-null `bool *` per registration.
    unsafe { write(data, updated) };
    true
}

pub(crate) unsafe fn get_core_options_version(_ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `unsigned *` per registration.
    unsafe { write::<c_uint>(data, CORE_OPTIONS_VERSION) };
    true
}

/// Legacy `{ key, "Description; a|b|c" }` array.
pub(crate) unsafe fn set_variables(ctx: &SessionContext, data: *mut c_void) -> bool {
    let first = data.cast_const().cast::<retro_variable>();
    // SAFETY: the array ends with a null key.
    let definitions = unsafe { terminated(first, MAX_TERMINATED_ENTRIES, |v| v.key.is_null()) }
        .filter_map(|v| {
            // SAFETY: both strings are NUL-terminated and owned by the core.
            let (key, declaration) = unsafe { (c_string(v.key)?, c_string(v.value)?) };
            let definition = OptionDefinition::from_legacy(&key, &declaration);
            if definition.is_none() {
                warn!(key = %key, "malformed legacy option declaration");
            }
            definition
        })
        .collect();
    ctx.options.lock().register(definitions, Vec::new());
    true
}

pub(crate) unsafe fn set_core_options(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null definition array per registration.
    let definitions = unsafe { v1_definitions(data.cast_const().cast()) };
    ctx.options.lock().register(definitions, Vec::new());
    true
}

/// Prefers the localized table, falling back to the US one.
pub(crate) unsafe fn set_core_options_intl(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_core_options_intl` per registration.
    let intl = unsafe { read::<retro_core_options_intl>(data) };
    let table = if intl.local.is_null() { intl.us } else { intl.local };
    if table.is_null() {
        warn!("localized core options without any table");
        return false;
    }
    // SAFETY: `table` is a definition array owned by the core.
    let definitions = unsafe { v1_definitions(table) };
    ctx.options.lock().register(definitions, Vec::new());
    true
}

pub(crate) unsafe fn set_core_options_v2(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_core_options_v2` per registration.
    unsafe { register_v2(ctx, data.cast_const().cast()) }
}

pub(crate) unsafe fn set_core_options_v2_intl(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_core_options_v2_intl` per registration.
    let intl = unsafe { read::<retro_core_options_v2_intl>(data) };
    let options = if intl.local.is_null() { intl.us } else { intl.local };
    if options.is_null() {
        warn!("localized v2 core options without any table");
        return false;
    }
    // SAFETY: `options` points at a v2 table owned by the core.
    unsafe { register_v2(ctx, options) }
}

pub(crate) unsafe fn set_core_options_display(ctx: &SessionContext, data: *mut c_void) -> bool {
    // SAFETY: non-null `retro_core_option_display` per registration.
    let display = unsafe { read::<retro_core_option_display>(data) };
    // SAFETY: the key is NUL-terminated.
    let Some(key) = (unsafe { c_string(display.key) }) else {
        return false;
    };
    if !ctx.options.lock().set_visible(&key, display.visible) {
        debug!(key = %key, "visibility for unknown option");
    }
    true
}

/// Null clears the registration.
pub(crate) unsafe fn set_update_display_callback(ctx: &SessionContext, data: *mut c_void) -> bool {
    let callback = if data.is_null() {
        None
    } else {
        // SAFETY: non-null `retro_core_options_update_display_callback`.
        unsafe { read::<retro_core_options_update_display_callback>(data) }.callback
    };
    debug!(registered = callback.is_some(), "options display callback");
    ctx.env.lock().update_display = callback;
    true
}

/// Core-initiated change. A null payload is a support query.
pub(crate) unsafe fn set_variable(ctx: &SessionContext, data: *mut c_void) -> bool {
    if data.is_null() {
        return true;
    }
    // SAFETY: non-null `retro_variable`.
    let variable = unsafe { read::<retro_variable>(data) };
    // SAFETY: both strings are NUL-terminated and owned by the core.
    let (Some(key), Some(value)) = (unsafe { c_string(variable.key) }, unsafe { c_string(variable.value) })
    else {
        warn!("option change without key or value");
        return false;
    };
    ctx.options.lock().set(&key, &value)
}

/// # Safety
/// `first` must point at a definition array terminated by a null key.
unsafe fn v1_definitions(first: *const retro_core_option_definition) -> Vec<OptionDefinition> {
    // SAFETY: caller contract.
    unsafe { terminated(first, MAX_TERMINATED_ENTRIES, |d| d.key.is_null()) }
        .filter_map(|d| {
            // SAFETY: all strings in a definition are NUL-terminated or null.
            unsafe {
                definition(
                    d.key,
                    d.desc,
                    d.info,
                    std::ptr::null(),
                    &d.values,
                    d.default_value,
                )
            }
        })
        .collect()
}

/// # Safety
/// `options` must point at a v2 table whose arrays are terminated by null keys.
unsafe fn register_v2(ctx: &SessionContext, options: *const retro_core_options_v2) -> bool {
    // SAFETY: caller contract.
    let options = unsafe { &*options };
    if options.definitions.is_null() {
        warn!("v2 core options without definitions");
        return false;
    }
    let first_category = options.categories.cast_const();
    // SAFETY: the category array (if any) ends with a null key.
    let categories = unsafe {
        terminated::<retro_core_option_v2_category>(first_category, MAX_TERMINATED_ENTRIES, |c| {
            c.key.is_null()
        })
    }
    .filter_map(|c| {
        // SAFETY: category strings are NUL-terminated or null.
        unsafe {
            Some(OptionCategory {
                key: c_string(c.key)?,
                description: c_string(c.desc).unwrap_or_default(),
                info: c_string(c.info).unwrap_or_default(),
            })
        }
    })
    .collect();
    let first_definition = options.definitions.cast_const();
    // SAFETY: the definition array ends with a null key.
    let definitions = unsafe {
        terminated::<retro_core_option_v2_definition>(first_definition, MAX_TERMINATED_ENTRIES, |d| {
            d.key.is_null()
        })
    }
    .filter_map(|d| {
        // SAFETY: as above.
        unsafe {
            definition(
                d.key,
                d.desc,
                d.info,
                d.category_key,
                &d.values,
                d.default_value,
            )
        }
    })
    .collect();
    ctx.options.lock().register(definitions, categories);
    true
}

/// # Safety
/// Every pointer must be null or a NUL-terminated string.
unsafe fn definition(
    key: *const c_char,
    desc: *const c_char,
    info: *const c_char,
    category: *const c_char,
    values: &[retro_core_option_value],
    default_value: *const c_char,
) -> Option<OptionDefinition> {
    // SAFETY: caller contract.
    unsafe {
        let key = c_string(key)?;
        let values: Vec<OptionValue> = values
            .iter()
            .take_while(|v| !v.value.is_null())
            .filter_map(|v| {
                Some(OptionValue {
                    value: c_string(v.value)?,
                    label: c_string(v.label),
                })
            })
            .collect();
        // A missing default means the first listed value.
        let default = match c_string(default_value) {
            Some(default) => default,
            None => values.first().map(|v| v.value.clone()).unwrap_or_default(),
        };
        Some(OptionDefinition {
            description: c_string(desc).unwrap_or_default(),
            info: c_string(info).unwrap_or_default(),
            category: c_string(category),
            values,
            ..OptionDefinition::new(key, default)
        })
    }
}
