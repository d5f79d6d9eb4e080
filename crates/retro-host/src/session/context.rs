use std::{
    ffi::{CStr, CString},
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rust_libretro_sys::retro_perf_counter;
use tracing::{info, warn};

use crate::{
    audio::AudioPipeline,
    config::{FrontendConfig, core_name_from_path},
    environment::EnvironmentState,
    input::InputState,
    options::CoreOptions,
    queue::CommandSender,
    video::VideoPipeline,
};

use super::{SessionEvent, SessionState, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CoreDir {
    System,
    Save,
    CoreAssets,
}

impl CoreDir {
    fn index(self) -> usize {
        self as usize
    }
}

/// A core-owned perf counter registered through the perf interface.
#[derive(Clone, Copy)]
pub(crate) struct PerfCounterPtr(pub(crate) *mut retro_perf_counter);

// SAFETY: the pointee is owned by the core, which keeps registered counters alive
// while loaded; the pointer is only dereferenced from core callbacks.
unsafe impl Send for PerfCounterPtr {}

/// State shared by the host thread, the emulation thread and every callback
/// the core makes. Callbacks reach it through the thread-local set by
/// [`ContextScope`](crate::ffi::ContextScope).
pub(crate) struct SessionContext {
    pub(crate) config: FrontendConfig,
    pub(crate) core_path: PathBuf,
    pub(crate) core_name: String,
    core_path_c: CString,
    username_c: CString,
    dirs: Mutex<[Option<CString>; 3]>,
    pub(crate) input: Arc<InputState>,
    pub(crate) options: Mutex<CoreOptions>,
    pub(crate) video: Mutex<VideoPipeline>,
    pub(crate) audio: Mutex<AudioPipeline>,
    pub(crate) env: Mutex<EnvironmentState>,
    pub(crate) perf_counters: Mutex<Vec<PerfCounterPtr>>,
    pub(crate) commands: CommandSender,
    events: Sender<SessionEvent>,
    /// Cleared to ask the emulation thread to leave its loop.
    pub(crate) running: AtomicBool,
    stop_reason: Mutex<Option<StopReason>>,
    state: AtomicU8,
}

impl SessionContext {
    pub(crate) fn new(
        config: FrontendConfig,
        core_path: &Path,
        input: Arc<InputState>,
        commands: CommandSender,
        events: Sender<SessionEvent>,
    ) -> Self {
        let core_name = core_name_from_path(core_path);
        let options = CoreOptions::with_file(config.options_file(&core_name));
        let core_path_c = c_path(core_path);
        let username_c = CString::new(config.username.replace('\0', "")).unwrap_or_default();
        Self {
            config,
            core_path: core_path.to_path_buf(),
            core_name,
            core_path_c,
            username_c,
            dirs: Mutex::new([None, None, None]),
            input,
            options: Mutex::new(options),
            video: Mutex::new(VideoPipeline::new()),
            audio: Mutex::new(AudioPipeline::new()),
            env: Mutex::new(EnvironmentState::default()),
            perf_counters: Mutex::new(Vec::new()),
            commands,
            events,
            running: AtomicBool::new(false),
            stop_reason: Mutex::new(None),
            state: AtomicU8::new(SessionState::Idle as u8),
        }
    }

    pub(crate) fn core_path_c(&self) -> &CStr {
        &self.core_path_c
    }

    pub(crate) fn username_c(&self) -> &CStr {
        &self.username_c
    }

    /// Creates the per-core directory on first use; the pointer stays valid for the session.
    pub(crate) fn core_dir(&self, kind: CoreDir) -> Option<*const std::ffi::c_char> {
        let mut dirs = self.dirs.lock();
        if let Some(dir) = &dirs[kind.index()] {
            return Some(dir.as_ptr());
        }
        let path = match kind {
            CoreDir::System => self.config.system_dir(&self.core_name),
            CoreDir::Save => self.config.save_dir(&self.core_name),
            CoreDir::CoreAssets => self.config.core_assets_dir(&self.core_name),
        };
        if let Err(err) = fs::create_dir_all(&path) {
            warn!(path = %path.display(), %err, "failed to create core directory");
            return None;
        }
        info!(?kind, path = %path.display(), "core directory ready");
        let dir = dirs[kind.index()].insert(c_path(&path));
        Some(dir.as_ptr())
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the emulation loop to stop; the first reason wins.
    pub(crate) fn request_stop(&self, reason: StopReason) {
        self.stop_reason.lock().get_or_insert(reason);
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn stop_reason(&self) -> Option<StopReason> {
        *self.stop_reason.lock()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

fn c_path(path: &Path) -> CString {
    CString::new(path.to_string_lossy().replace('\0', "")).unwrap_or_default()
}
