//! VFS interface (version 3) backed by `std::fs`.
//!
//! File and directory handles are boxed Rust values passed to the core as
//! opaque pointers; `close`/`closedir` take them back.

use std::{
    ffi::{CStr, CString, c_char, c_int, c_uint, c_void},
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
    slice,
};

use rust_libretro_sys::{retro_vfs_dir_handle, retro_vfs_file_handle, retro_vfs_interface};
use tracing::debug;

use super::guarded;

/// Highest interface version served.
pub(crate) const VFS_VERSION: u32 = 3;

const MODE_READ: c_uint = 1 << 0;
const MODE_WRITE: c_uint = 1 << 1;
const MODE_UPDATE_EXISTING: c_uint = 1 << 2;

const SEEK_START: c_int = 0;
const SEEK_CURRENT: c_int = 1;
const SEEK_END: c_int = 2;

const STAT_IS_VALID: c_int = 1 << 0;
const STAT_IS_DIRECTORY: c_int = 1 << 1;

pub(crate) static VFS_INTERFACE: retro_vfs_interface = retro_vfs_interface {
    get_path: Some(vfs_get_path),
    open: Some(vfs_open),
    close: Some(vfs_close),
    size: Some(vfs_size),
    tell: Some(vfs_tell),
    seek: Some(vfs_seek),
    read: Some(vfs_read),
    write: Some(vfs_write),
    flush: Some(vfs_flush),
    remove: Some(vfs_remove),
    rename: Some(vfs_rename),
    truncate: Some(vfs_truncate),
    stat: Some(vfs_stat),
    mkdir: Some(vfs_mkdir),
    opendir: Some(vfs_opendir),
    readdir: Some(vfs_readdir),
    dirent_get_name: Some(vfs_dirent_get_name),
    dirent_is_dir: Some(vfs_dirent_is_dir),
    closedir: Some(vfs_closedir),
};

struct VfsFile {
    path: CString,
    file: File,
}

struct VfsDir {
    entries: fs::ReadDir,
    include_hidden: bool,
    current: Option<(CString, bool)>,
}

fn open_options(mode: c_uint) -> Option<OpenOptions> {
    let read = mode & MODE_READ != 0;
    let write = mode & MODE_WRITE != 0;
    if !read && !write {
        return None;
    }
    let mut options = OpenOptions::new();
    options.read(read);
    if write {
        let update = mode & MODE_UPDATE_EXISTING != 0;
        options.write(true).create(true).truncate(!update);
    }
    Some(options)
}

/// # Safety
/// `path` must be null or NUL-terminated.
unsafe fn path_arg(path: *const c_char) -> Option<PathBuf> {
    if path.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    let path = unsafe { CStr::from_ptr(path) };
    Some(PathBuf::from(path.to_string_lossy().into_owned()))
}

/// # Safety
/// `stream` must be null or a handle returned by `vfs_open` and not yet closed.
unsafe fn file_mut<'a>(stream: *mut retro_vfs_file_handle) -> Option<&'a mut VfsFile> {
    // SAFETY: guaranteed by the caller.
    unsafe { stream.cast::<VfsFile>().as_mut() }
}

unsafe extern "C" fn vfs_get_path(stream: *mut retro_vfs_file_handle) -> *const c_char {
    // SAFETY: the core passes a handle we issued.
    match unsafe { file_mut(stream) } {
        Some(file) => file.path.as_ptr(),
        None => std::ptr::null(),
    }
}

unsafe extern "C" fn vfs_open(
    path: *const c_char,
    mode: c_uint,
    _hints: c_uint,
) -> *mut retro_vfs_file_handle {
    guarded("vfs_open", std::ptr::null_mut(), || {
        // SAFETY: the core passes a NUL-terminated path.
        let Some(path_buf) = (unsafe { path_arg(path) }) else {
            return std::ptr::null_mut();
        };
        let Some(options) = open_options(mode) else {
            return std::ptr::null_mut();
        };
        match options.open(&path_buf) {
            Ok(file) => {
                // SAFETY: `path_arg` already validated the pointer.
                let path = unsafe { CStr::from_ptr(path) }.to_owned();
                Box::into_raw(Box::new(VfsFile { path, file })).cast()
            }
            Err(err) => {
                debug!(path = %path_buf.display(), mode, %err, "vfs open failed");
                std::ptr::null_mut()
            }
        }
    })
}

unsafe extern "C" fn vfs_close(stream: *mut retro_vfs_file_handle) -> c_int {
    if stream.is_null() {
        return -1;
    }
    // SAFETY: the handle came from `Box::into_raw` in `vfs_open`; the core closes it once.
    drop(unsafe { Box::from_raw(stream.cast::<VfsFile>()) });
    0
}

unsafe extern "C" fn vfs_size(stream: *mut retro_vfs_file_handle) -> i64 {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    file.file.metadata().map_or(-1, |m| m.len() as i64)
}

unsafe extern "C" fn vfs_tell(stream: *mut retro_vfs_file_handle) -> i64 {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    file.file.stream_position().map_or(-1, |p| p as i64)
}

unsafe extern "C" fn vfs_seek(
    stream: *mut retro_vfs_file_handle,
    offset: i64,
    seek_position: c_int,
) -> i64 {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    let target = match seek_position {
        SEEK_START if offset >= 0 => SeekFrom::Start(offset as u64),
        SEEK_CURRENT => SeekFrom::Current(offset),
        SEEK_END => SeekFrom::End(offset),
        _ => return -1,
    };
    file.file.seek(target).map_or(-1, |p| p as i64)
}

unsafe extern "C" fn vfs_read(stream: *mut retro_vfs_file_handle, s: *mut c_void, len: u64) -> i64 {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    if s.is_null() {
        return -1;
    }
    // SAFETY: the core provides a writable buffer of `len` bytes.
    let buf = unsafe { slice::from_raw_parts_mut(s.cast::<u8>(), len as usize) };
    let mut filled = 0;
    while filled < buf.len() {
        match file.file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => return -1,
        }
    }
    filled as i64
}

unsafe extern "C" fn vfs_write(
    stream: *mut retro_vfs_file_handle,
    s: *const c_void,
    len: u64,
) -> i64 {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    if s.is_null() {
        return -1;
    }
    // SAFETY: the core provides `len` readable bytes.
    let buf = unsafe { slice::from_raw_parts(s.cast::<u8>(), len as usize) };
    file.file.write_all(buf).map_or(-1, |_| len as i64)
}

unsafe extern "C" fn vfs_flush(stream: *mut retro_vfs_file_handle) -> c_int {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    file.file.flush().map_or(-1, |_| 0)
}

unsafe extern "C" fn vfs_remove(path: *const c_char) -> c_int {
    // SAFETY: the core passes a NUL-terminated path.
    let Some(path) = (unsafe { path_arg(path) }) else {
        return -1;
    };
    let result = if path.is_dir() {
        fs::remove_dir(&path)
    } else {
        fs::remove_file(&path)
    };
    result.map_or(-1, |_| 0)
}

unsafe extern "C" fn vfs_rename(old_path: *const c_char, new_path: *const c_char) -> c_int {
    // SAFETY: the core passes NUL-terminated paths.
    let (Some(from), Some(to)) = (unsafe { path_arg(old_path) }, unsafe { path_arg(new_path) })
    else {
        return -1;
    };
    fs::rename(from, to).map_or(-1, |_| 0)
}

unsafe extern "C" fn vfs_truncate(stream: *mut retro_vfs_file_handle, length: i64) -> i64 {
    // SAFETY: the core passes a handle we issued.
    let Some(file) = (unsafe { file_mut(stream) }) else {
        return -1;
    };
    if length < 0 {
        return -1;
    }
    file.file.set_len(length as u64).map_or(-1, |_| 0)
}

unsafe extern "C" fn vfs_stat(path: *const c_char, size: *mut i32) -> c_int {
    // SAFETY: the core passes a NUL-terminated path.
    let Some(path) = (unsafe { path_arg(path) }) else {
        return 0;
    };
    let Ok(metadata) = fs::metadata(path) else {
        return 0;
    };
    if !size.is_null() {
        // SAFETY: the core passes a writable `int32_t` or null.
        unsafe { *size = metadata.len().min(i32::MAX as u64) as i32 };
    }
    let mut flags = STAT_IS_VALID;
    if metadata.is_dir() {
        flags |= STAT_IS_DIRECTORY;
    }
    flags
}

unsafe extern "C" fn vfs_mkdir(dir: *const c_char) -> c_int {
    // SAFETY: the core passes a NUL-terminated path.
    let Some(dir) = (unsafe { path_arg(dir) }) else {
        return -1;
    };
    match fs::create_dir(&dir) {
        Ok(()) => 0,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => -2,
        Err(_) => -1,
    }
}

unsafe extern "C" fn vfs_opendir(dir: *const c_char, include_hidden: bool) -> *mut retro_vfs_dir_handle {
    // SAFETY: the core passes a NUL-terminated path.
    let Some(dir) = (unsafe { path_arg(dir) }) else {
        return std::ptr::null_mut();
    };
    match fs::read_dir(&dir) {
        Ok(entries) => Box::into_raw(Box::new(VfsDir {
            entries,
            include_hidden,
            current: None,
        }))
        .cast(),
        Err(_) => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn vfs_readdir(dirstream: *mut retro_vfs_dir_handle) -> bool {
    // SAFETY: the core passes a handle we issued.
    let Some(dir) = (unsafe { dirstream.cast::<VfsDir>().as_mut() }) else {
        return false;
    };
    for entry in dir.entries.by_ref() {
        let Ok(entry) = entry else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !dir.include_hidden && name.starts_with('.') {
            continue;
        }
        let Ok(name) = CString::new(name) else {
            continue;
        };
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        dir.current = Some((name, is_dir));
        return true;
    }
    dir.current = None;
    false
}

unsafe extern "C" fn vfs_dirent_get_name(dirstream: *mut retro_vfs_dir_handle) -> *const c_char {
    // SAFETY: the core passes a handle we issued.
    match unsafe { dirstream.cast::<VfsDir>().as_ref() }.and_then(|d| d.current.as_ref()) {
        Some((name, _)) => name.as_ptr(),
        None => std::ptr::null(),
    }
}

unsafe extern "C" fn vfs_dirent_is_dir(dirstream: *mut retro_vfs_dir_handle) -> bool {
    // SAFETY: the core passes a handle we issued.
    unsafe { dirstream.cast::<VfsDir>().as_ref() }
        .and_then(|d| d.current.as_ref())
        .is_some_and(|(_, is_dir)| *is_dir)
}

unsafe extern "C" fn vfs_closedir(dirstream: *mut retro_vfs_dir_handle) -> c_int {
    if dirstream.is_null() {
        return -1;
    }
    // SAFETY: the handle came from `Box::into_raw` in `vfs_opendir`.
    drop(unsafe { Box::from_raw(dirstream.cast::<VfsDir>()) });
    0
}
