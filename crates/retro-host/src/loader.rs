//! Loading a core module and binding its entry points.
//!
//! The module file is copied to a uniquely named scratch file before it is
//! opened, so the original stays replaceable while a session runs. Every
//! entry point must resolve; a module with a single missing symbol is
//! rejected before any of its code runs.

use std::{
    ffi::{c_char, c_uint, c_void},
    fs,
    path::{Path, PathBuf},
};

use libloading::Library;
use rand::Rng;
use rust_libretro_sys::{
    retro_audio_sample_batch_t, retro_audio_sample_t, retro_environment_t, retro_game_info,
    retro_input_poll_t, retro_input_state_t, retro_system_av_info, retro_system_info,
    retro_video_refresh_t,
};
use tracing::{debug, info, warn};

use crate::{config::core_name_from_path, error::LoadError};

const SCRATCH_SUFFIX_BYTES: usize = 10;

/// Anything that can hand out entry-point addresses by symbol name.
pub trait SymbolSource {
    fn resolve(&self, name: &str) -> Option<*const c_void>;
}

impl SymbolSource for Library {
    fn resolve(&self, name: &str) -> Option<*const c_void> {
        // SAFETY: the symbol is only read as an address here; callers transmute it to the
        // signature the ABI fixes for that name.
        let symbol = unsafe { self.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let ptr = *symbol;
        (!ptr.is_null()).then_some(ptr)
    }
}

macro_rules! core_api {
    ($($name:ident : $ty:ty,)*) => {
        /// Resolved entry points of a core module.
        #[derive(Clone, Copy)]
        pub struct CoreApi {
            $(pub $name: $ty,)*
        }

        impl CoreApi {
            /// Every symbol a module must export.
            pub const SYMBOLS: &'static [&'static str] = &[$(stringify!($name),)*];

            /// Resolves all entry points, or reports every missing one.
            pub fn resolve<S: SymbolSource + ?Sized>(source: &S) -> Result<Self, LoadError> {
                let mut missing = Vec::new();
                $(
                    let $name = source.resolve(stringify!($name));
                    if $name.is_none() {
                        missing.push(stringify!($name));
                    }
                )*
                if !missing.is_empty() {
                    return Err(LoadError::MissingSymbols { missing });
                }
                // SAFETY: every pointer was checked above and names an entry point whose C
                // signature is fixed by the ABI; `$ty` mirrors that signature.
                Ok(unsafe {
                    Self {
                        $($name: std::mem::transmute::<*const c_void, $ty>(
                            $name.unwrap_or(std::ptr::null()),
                        ),)*
                    }
                })
            }
        }
    };
}

core_api! {
    retro_api_version: unsafe extern "C" fn() -> c_uint,
    retro_init: unsafe extern "C" fn(),
    retro_deinit: unsafe extern "C" fn(),
    retro_set_environment: unsafe extern "C" fn(retro_environment_t),
    retro_set_video_refresh: unsafe extern "C" fn(retro_video_refresh_t),
    retro_set_audio_sample: unsafe extern "C" fn(retro_audio_sample_t),
    retro_set_audio_sample_batch: unsafe extern "C" fn(retro_audio_sample_batch_t),
    retro_set_input_poll: unsafe extern "C" fn(retro_input_poll_t),
    retro_set_input_state: unsafe extern "C" fn(retro_input_state_t),
    retro_set_controller_port_device: unsafe extern "C" fn(c_uint, c_uint),
    retro_run: unsafe extern "C" fn(),
    retro_get_system_info: unsafe extern "C" fn(*mut retro_system_info),
    retro_get_system_av_info: unsafe extern "C" fn(*mut retro_system_av_info),
    retro_load_game: unsafe extern "C" fn(*const retro_game_info) -> bool,
    retro_load_game_special: unsafe extern "C" fn(c_uint, *const retro_game_info, usize) -> bool,
    retro_unload_game: unsafe extern "C" fn(),
    retro_serialize_size: unsafe extern "C" fn() -> usize,
    retro_serialize: unsafe extern "C" fn(*mut c_void, usize) -> bool,
    retro_unserialize: unsafe extern "C" fn(*const c_void, usize) -> bool,
    retro_reset: unsafe extern "C" fn(),
    retro_cheat_reset: unsafe extern "C" fn(),
    retro_cheat_set: unsafe extern "C" fn(c_uint, bool, *const c_char),
    retro_get_region: unsafe extern "C" fn() -> c_uint,
    retro_get_memory_data: unsafe extern "C" fn(c_uint) -> *mut c_void,
    retro_get_memory_size: unsafe extern "C" fn(c_uint) -> usize,
}

/// The frontend functions a module is wired to right after binding.
#[derive(Clone, Copy)]
pub struct Callbacks {
    pub environment: retro_environment_t,
    pub video_refresh: retro_video_refresh_t,
    pub audio_sample: retro_audio_sample_t,
    pub audio_sample_batch: retro_audio_sample_batch_t,
    pub input_poll: retro_input_poll_t,
    pub input_state: retro_input_state_t,
}

impl CoreApi {
    /// Hands the frontend callbacks to the module, then runs its one-time initialization.
    ///
    /// # Safety
    /// The entry points must belong to a live module and `callbacks` must stay valid for as
    /// long as the module may call them.
    pub unsafe fn install(&self, callbacks: &Callbacks) {
        unsafe {
            (self.retro_set_environment)(callbacks.environment);
            (self.retro_set_video_refresh)(callbacks.video_refresh);
            (self.retro_set_audio_sample)(callbacks.audio_sample);
            (self.retro_set_audio_sample_batch)(callbacks.audio_sample_batch);
            (self.retro_set_input_poll)(callbacks.input_poll);
            (self.retro_set_input_state)(callbacks.input_state);
            (self.retro_init)();
        }
    }
}

/// A loaded, initialized core module.
///
/// Dropping the handle closes the OS library and deletes the scratch copy.
pub struct ModuleHandle {
    api: CoreApi,
    library: Option<Library>,
    path: PathBuf,
    scratch: Option<PathBuf>,
    name: String,
    pub(crate) supports_no_game: bool,
}

impl ModuleHandle {
    /// Wraps entry points that live in this process rather than in a loaded library.
    pub(crate) fn from_api(api: CoreApi, path: PathBuf) -> Self {
        let name = core_name_from_path(&path);
        Self {
            api,
            library: None,
            path,
            scratch: None,
            name,
            supports_no_game: false,
        }
    }

    pub fn api(&self) -> &CoreApi {
        &self.api
    }

    /// Path of the module as given by the caller, not the scratch copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_deref()
    }

    /// Module name used for per-core directories and the options file.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supports_no_game(&self) -> bool {
        self.supports_no_game
    }

    /// Releases the library and deletes the scratch copy.
    pub fn unload(self) {
        drop(self);
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if let Some(library) = self.library.take()
            && let Err(err) = library.close()
        {
            warn!(path = %self.path.display(), %err, "failed to close core module");
        }
        if let Some(scratch) = self.scratch.take() {
            remove_scratch(&scratch);
        }
        debug!(core = %self.name, "core module unloaded");
    }
}

/// Loads modules from disk via scratch copies in `temp_dir`.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    temp_dir: PathBuf,
}

impl ModuleLoader {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    /// Copies, opens and binds the module at `path`, installs `callbacks` and initializes it.
    ///
    /// Nothing from the module runs unless every entry point resolved.
    pub fn load(&self, path: &Path, callbacks: &Callbacks) -> Result<ModuleHandle, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let scratch = self.scratch_path_for(path);
        if let Err(source) = fs::create_dir_all(&self.temp_dir).and_then(|_| fs::copy(path, &scratch))
        {
            return Err(LoadError::Copy {
                from: path.to_path_buf(),
                to: scratch,
                source,
            });
        }

        // SAFETY: loading a library runs its initializers; the module is trusted by the caller
        // that chose to load it.
        let library = match unsafe { Library::new(&scratch) } {
            Ok(library) => library,
            Err(source) => {
                remove_scratch(&scratch);
                return Err(LoadError::Open {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let api = match CoreApi::resolve(&library) {
            Ok(api) => api,
            Err(err) => {
                drop(library);
                remove_scratch(&scratch);
                return Err(err);
            }
        };

        let mut module = ModuleHandle::from_api(api, path.to_path_buf());
        module.library = Some(library);
        module.scratch = Some(scratch);

        // SAFETY: the library stays open for the lifetime of `module`.
        unsafe { module.api.install(callbacks) };
        info!(core = %module.name, path = %path.display(), "core module loaded");
        Ok(module)
    }

    /// `<temp>/<stem minus _libretro><20 hex chars><.ext>`.
    pub fn scratch_path_for(&self, path: &Path) -> PathBuf {
        let mut suffix = [0u8; SCRATCH_SUFFIX_BYTES];
        rand::rng().fill(&mut suffix[..]);
        let mut file_name = core_name_from_path(path);
        file_name.push_str(&hex::encode(suffix));
        if let Some(ext) = path.extension() {
            file_name.push('.');
            file_name.push_str(&ext.to_string_lossy());
        }
        self.temp_dir.join(file_name)
    }
}

fn remove_scratch(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), %err, "failed to delete core scratch copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ScratchDir;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static SET_ENVIRONMENT_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn fake_set_environment(_cb: retro_environment_t) {
        SET_ENVIRONMENT_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn fake_noop() {}

    struct FakeSource(HashMap<&'static str, *const c_void>);

    impl SymbolSource for FakeSource {
        fn resolve(&self, name: &str) -> Option<*const c_void> {
            self.0.get(name).copied()
        }
    }

    fn fake_source_without(missing: &str) -> FakeSource {
        let mut map = HashMap::new();
        for &name in CoreApi::SYMBOLS {
            let ptr = if name == "retro_set_environment" {
                fake_set_environment as *const c_void
            } else {
                fake_noop as *const c_void
            };
            if name != missing {
                map.insert(name, ptr);
            }
        }
        FakeSource(map)
    }

    #[test]
    fn every_abi_entry_point_is_required() {
        assert_eq!(CoreApi::SYMBOLS.len(), 25);
        assert!(CoreApi::SYMBOLS.contains(&"retro_run"));
        assert!(CoreApi::SYMBOLS.contains(&"retro_get_memory_size"));
    }

    #[test]
    fn one_missing_symbol_fails_binding_without_touching_the_module() {
        let before = SET_ENVIRONMENT_CALLS.load(Ordering::SeqCst);
        let source = fake_source_without("retro_get_region");
        match CoreApi::resolve(&source) {
            Err(LoadError::MissingSymbols { missing }) => {
                assert_eq!(missing, vec!["retro_get_region"]);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("binding must fail"),
        }
        assert_eq!(SET_ENVIRONMENT_CALLS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn complete_source_binds() {
        let source = fake_source_without("");
        assert!(CoreApi::resolve(&source).is_ok());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = ScratchDir::new("loader-missing");
        let loader = ModuleLoader::new(dir.path());
        let callbacks = crate::ffi::callbacks();
        let err = loader
            .load(&dir.path().join("nope_libretro.so"), &callbacks)
            .err();
        assert!(matches!(err, Some(LoadError::NotFound { .. })));
    }

    #[test]
    fn unloadable_file_leaves_no_scratch_copy_behind() {
        let dir = ScratchDir::new("loader-garbage");
        let temp = dir.path().join("tmp");
        let module = dir.path().join("garbage_libretro.so");
        fs::write(&module, b"definitely not a shared object").expect("write module");

        let loader = ModuleLoader::new(&temp);
        let callbacks = crate::ffi::callbacks();
        let err = loader.load(&module, &callbacks).err();
        assert!(matches!(err, Some(LoadError::Open { .. })));

        let leftovers = fs::read_dir(&temp).map(|it| it.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
        assert!(module.exists());
    }

    #[test]
    fn scratch_name_keeps_stem_and_extension() {
        let loader = ModuleLoader::new("/tmp/scratch");
        let path = loader.scratch_path_for(Path::new("/cores/snes9x_libretro.so"));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with("snes9x"));
        assert!(name.ends_with(".so"));
        let hex_part = &name["snes9x".len()..name.len() - ".so".len()];
        assert_eq!(hex_part.len(), SCRATCH_SUFFIX_BYTES * 2);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(
            path,
            loader.scratch_path_for(Path::new("/cores/snes9x_libretro.so"))
        );
    }
}
