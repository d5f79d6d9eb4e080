//! Command handlers, grouped by the component they talk to.
//!
//! Every handler has the [`Handler`](super::Handler) signature. Handlers
//! registered with [`Payload::Required`](super::Payload::Required) are never
//! called with a null payload.

pub(super) mod audio;
pub(super) mod input;
pub(super) mod interfaces;
pub(super) mod options;
pub(super) mod system;
pub(super) mod video;

use std::ffi::c_void;

/// Reads the payload as `T`.
///
/// # Safety
/// `data` must be non-null, aligned and point at a valid `T`.
unsafe fn read<T: Copy>(data: *mut c_void) -> T {
    unsafe { data.cast::<T>().read() }
}

/// Writes `value` through the payload pointer.
///
/// # Safety
/// `data` must be non-null, aligned and point at storage for a `T`.
unsafe fn write<T>(data: *mut c_void, value: T) {
    unsafe { data.cast::<T>().write(value) }
}

/// Walks a core array terminated by an entry for which `end` holds, at most
/// `limit` entries.
///
/// # Safety
/// `first` must point at an array that contains a terminating entry or at
/// least `limit` valid entries.
unsafe fn terminated<'a, T: 'a>(
    first: *const T,
    limit: usize,
    end: impl Fn(&T) -> bool + 'a,
) -> impl Iterator<Item = &'a T> + 'a {
    let mut index = 0;
    std::iter::from_fn(move || {
        if first.is_null() || index >= limit {
            return None;
        }
        // SAFETY: caller contract; we stop at the terminator.
        let entry = unsafe { &*first.add(index) };
        if end(entry) {
            return None;
        }
        index += 1;
        Some(entry)
    })
}

/// Upper bound for arrays the ABI terminates with a null key.
const MAX_TERMINATED_ENTRIES: usize = 4096;
