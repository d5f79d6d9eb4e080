//! Session lifecycle: load, negotiate, run on a dedicated thread, tear down.
//!
//! The host thread owns a [`Session`] and calls [`Session::tick`] once per
//! host frame. Startup runs synchronously up to HW context creation; the
//! audio handshake completes on the first tick after that.

pub(crate) mod context;
pub mod pacing;
mod runner;


use std::{
    ffi::CString,
    fs,
    path::{Path, PathBuf},
    ptr,
    sync::{Arc, atomic::Ordering},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use rust_libretro_sys::{retro_game_info, retro_system_av_info};
use tracing::{error, info, warn};

use crate::{
    config::FrontendConfig,
    error::{LoadError, SessionError},
    ffi::{self, ContextScope},
    host::{Host, NullAudioOutput},
    input::{InputState, KeyEvent},
    loader::{CoreApi, ModuleHandle, ModuleLoader, SymbolSource},
    options::OptionsSnapshot,
    queue::{self, CommandReceiver, DeferredCommand},
    video::Geometry,
};

use self::{
    context::SessionContext,
    pacing::{Clock, DEFAULT_FPS, MonotonicClock},
    runner::{LoadedContent, Runner, RunnerParts},
};

/// Phases of a session, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Loading,
    GameLoading,
    AvNegotiating,
    HwContextInit,
    AudioHandshake,
    Running,
    Stopping,
}

impl SessionState {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Loading,
            2 => Self::GameLoading,
            3 => Self::AvNegotiating,
            4 => Self::HwContextInit,
            5 => Self::AudioHandshake,
            6 => Self::Running,
            7 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HostRequest,
    /// The core issued SHUTDOWN.
    CoreShutdown,
    /// Startup failed after the core was initialized.
    StartupFailure,
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// On-screen message from the core, shown for `frames` frames.
    Message { text: String, frames: u32 },
    Stopped { reason: StopReason },
}

/// Requests delivered to the emulation thread between frames.
pub(crate) enum Control {
    Key(KeyEvent),
    ControllerDevice { port: u32, device: u32 },
    RefreshOptionDisplay,
}

/// Timing and geometry reported by the core after content load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvInfo {
    pub fps: f64,
    pub sample_rate: f64,
    pub geometry: Geometry,
}

struct Active {
    ctx: Arc<SessionContext>,
    commands: CommandReceiver,
    control: Sender<Control>,
    join: JoinHandle<Option<Box<dyn crate::host::GlContextFactory>>>,
    av: AvInfo,
}

/// One core, one piece of content, one emulation thread.
pub struct Session {
    config: FrontendConfig,
    host: Host,
    input: Arc<InputState>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    clock: Option<Box<dyn Clock>>,
    active: Option<Active>,
}

impl Session {
    pub fn new(config: FrontendConfig, host: Host) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            host,
            input: Arc::new(InputState::new()),
            events_tx,
            events_rx,
            clock: None,
            active: None,
        }
    }

    /// Replaces the wall clock used by the next session's pacing loop.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    /// Input written by the host and read by the core.
    pub fn input(&self) -> &Arc<InputState> {
        &self.input
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events_rx
    }

    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Idle, |active| active.ctx.state())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn av_info(&self) -> Option<AvInfo> {
        self.active.as_ref().map(|active| active.av)
    }

    /// Loads `core_path` and starts emulating `content`.
    ///
    /// Returns once the emulation thread exists and any GL context is set up.
    /// Nothing keeps running after an error.
    pub fn start(&mut self, core_path: &Path, content: Option<&Path>) -> Result<(), SessionError> {
        let loader = ModuleLoader::new(&self.config.temp_dir);
        self.begin(core_path, content, |callbacks| loader.load(core_path, callbacks))
    }

    /// Starts a session over entry points already present in the process.
    pub(crate) fn start_with_symbols<S: SymbolSource + ?Sized>(
        &mut self,
        source: &S,
        core_path: &Path,
        content: Option<&Path>,
    ) -> Result<(), SessionError> {
        self.begin(core_path, content, |callbacks| {
            let api = CoreApi::resolve(source)?;
            let module = ModuleHandle::from_api(api, core_path.to_path_buf());
            // SAFETY: in-process entry points live for the whole program.
            unsafe { module.api().install(callbacks) };
            Ok(module)
        })
    }

    fn begin(
        &mut self,
        core_path: &Path,
        content: Option<&Path>,
        bind: impl FnOnce(&crate::loader::Callbacks) -> Result<ModuleHandle, LoadError>,
    ) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let (commands_tx, commands) = queue::channel();
        let ctx = Arc::new(SessionContext::new(
            self.config.clone(),
            core_path,
            Arc::clone(&self.input),
            commands_tx,
            self.events_tx.clone(),
        ));
        ctx.running.store(true, Ordering::Release);
        ctx.set_state(SessionState::Loading);

        let prepared = {
            let _scope = ContextScope::enter(Arc::clone(&ctx));
            self.prepare(&ctx, content, bind)
        };
        let (module, loaded, av) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(core = %core_path.display(), %err, "session startup failed");
                ctx.set_state(SessionState::Idle);
                return Err(err);
            }
        };

        let (control_tx, control_rx) = unbounded();
        let (startup_tx, startup_rx) = bounded(1);
        let parts = RunnerParts {
            ctx: Arc::clone(&ctx),
            module,
            content: loaded,
            control: control_rx,
            clock: self
                .clock
                .take()
                .unwrap_or_else(|| Box::new(MonotonicClock::new())),
            fps: av.fps,
            sample_rate: av.sample_rate,
            gl: self.host.gl.take(),
            startup: startup_tx,
        };
        let join = thread::Builder::new()
            .name("retro-host-emu".into())
            .spawn(move || Runner::new(parts).run())
            .map_err(|err| {
                ctx.set_state(SessionState::Idle);
                SessionError::Spawn(err)
            })?;

        let outcome = startup_rx.recv().unwrap_or(Err(SessionError::ThreadLost));
        if let Err(err) = outcome {
            error!(%err, "emulation thread failed to start");
            self.host.gl = join.join().ok().flatten();
            ctx.set_state(SessionState::Idle);
            return Err(err);
        }

        info!(core = %ctx.core_name, fps = av.fps, sample_rate = av.sample_rate, "session started");
        self.active = Some(Active {
            ctx,
            commands,
            control: control_tx,
            join,
            av,
        });
        Ok(())
    }

    /// Load, game load and AV negotiation, run with `ctx` current.
    fn prepare(
        &self,
        ctx: &SessionContext,
        content: Option<&Path>,
        bind: impl FnOnce(&crate::loader::Callbacks) -> Result<ModuleHandle, LoadError>,
    ) -> Result<(ModuleHandle, LoadedContent, AvInfo), SessionError> {
        let mut module = bind(&ffi::callbacks())?;
        module.supports_no_game = ctx.env.lock().support_no_game;

        ctx.set_state(SessionState::GameLoading);
        let loaded = match load_content(&module, content) {
            Ok(loaded) => loaded,
            Err(err) => {
                // SAFETY: the module was initialized by `bind`.
                unsafe { (module.api().retro_deinit)() };
                return Err(err);
            }
        };

        ctx.set_state(SessionState::AvNegotiating);
        let av = query_av_info(&module);
        ctx.video.lock().set_geometry(av.geometry);
        ctx.env.lock().fps = Some(av.fps);
        info!(
            fps = av.fps,
            sample_rate = av.sample_rate,
            width = av.geometry.base_width,
            height = av.geometry.base_height,
            "AV info negotiated"
        );
        Ok((module, loaded, av))
    }

    /// Executes queued host work and finishes a session the core ended.
    ///
    /// Returns the number of commands executed.
    pub fn tick(&mut self) -> usize {
        let Some(active) = &self.active else {
            return 0;
        };
        let host = &mut self.host;
        let executed = active.commands.drain(|command| execute(host, command));
        let finished = !active.ctx.is_running() && active.join.is_finished();
        if finished {
            self.finish();
        }
        executed
    }

    /// Stops the emulation thread and waits for it.
    ///
    /// A core that never returns from `retro_run` blocks this call.
    pub fn stop(&mut self) {
        if let Some(active) = &self.active {
            active.ctx.request_stop(StopReason::HostRequest);
            self.finish();
        }
    }

    fn finish(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        match active.join.join() {
            Ok(gl) => self.host.gl = gl,
            Err(_) => error!("emulation thread panicked"),
        }
        let host = &mut self.host;
        active.commands.drain(|command| execute(host, command));
        self.host.audio.close();
        let reason = active.ctx.stop_reason().unwrap_or(StopReason::HostRequest);
        active.ctx.set_state(SessionState::Idle);
        info!(?reason, "session stopped");
        let _ = self.events_tx.send(SessionEvent::Stopped { reason });
    }

    /// Host-side option change; applies to known keys with non-empty values.
    pub fn set_option(&mut self, key: &str, value: &str) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        let changed = active.ctx.options.lock().set(key, value);
        if changed {
            let _ = active.control.send(Control::RefreshOptionDisplay);
        }
        changed
    }

    pub fn options(&self) -> Option<OptionsSnapshot> {
        self.active
            .as_ref()
            .map(|active| active.ctx.options.lock().snapshot())
    }

    /// Forwarded to the core before its next frame.
    pub fn set_controller_port_device(&self, port: u32, device: u32) -> bool {
        self.active.as_ref().is_some_and(|active| {
            active
                .control
                .send(Control::ControllerDevice { port, device })
                .is_ok()
        })
    }

    /// Delivered to the core's keyboard callback before its next frame.
    pub fn post_key_event(&self, event: KeyEvent) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.control.send(Control::Key(event)).is_ok())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn execute(host: &mut Host, command: DeferredCommand) {
    match command {
        DeferredCommand::InitAudio {
            sample_rate,
            buffer_secs,
            reply,
        } => {
            let output = match host.audio.open(sample_rate, buffer_secs) {
                Ok(output) => output,
                Err(err) => {
                    warn!(%err, "audio device unavailable, discarding audio");
                    let frames = (sample_rate * f64::from(buffer_secs)).ceil().max(1.0) as usize;
                    Box::new(NullAudioOutput::new(frames))
                }
            };
            let _ = reply.send(output);
        }
        DeferredCommand::CreateTexture {
            width,
            height,
            format,
            pixels,
            flip_y,
        } => host.video.create_image(width, height, format, &pixels, flip_y),
        DeferredCommand::UpdateTexture { pixels, flip_y } => {
            host.video.update_image(&pixels, flip_y)
        }
    }
}

fn load_content(module: &ModuleHandle, content: Option<&Path>) -> Result<LoadedContent, SessionError> {
    let Some(path) = content else {
        if !module.supports_no_game() {
            return Err(SessionError::ContentRequired);
        }
        // SAFETY: null game info is how a no-content start is requested.
        let accepted = unsafe { (module.api().retro_load_game)(ptr::null()) };
        if !accepted {
            return Err(SessionError::GameRejected { path: None });
        }
        return Ok(LoadedContent {
            path: None,
            data: None,
        });
    };

    let data = fs::read(path).map_err(|source| SessionError::ContentRead {
        path: path.to_path_buf(),
        source,
    })?;
    let c_path = CString::new(path.to_string_lossy().into_owned()).map_err(|_| {
        SessionError::InvalidContentPath {
            path: path.to_path_buf(),
        }
    })?;
    let info = retro_game_info {
        path: c_path.as_ptr(),
        data: data.as_ptr().cast(),
        size: data.len(),
        meta: ptr::null(),
    };
    // SAFETY: `info` and the buffers it points at outlive the call.
    let accepted = unsafe { (module.api().retro_load_game)(&info) };
    if !accepted {
        return Err(SessionError::GameRejected {
            path: Some(PathBuf::from(path)),
        });
    }
    info!(content = %path.display(), bytes = data.len(), "content loaded");
    Ok(LoadedContent {
        path: Some(c_path),
        data: Some(data),
    })
}

fn query_av_info(module: &ModuleHandle) -> AvInfo {
    // SAFETY: all-zero is a valid `retro_system_av_info`.
    let mut av: retro_system_av_info = unsafe { std::mem::zeroed() };
    // SAFETY: the core fills the struct in.
    unsafe { (module.api().retro_get_system_av_info)(&mut av) };
    let mut fps = av.timing.fps;
    if !(fps.is_finite() && fps > 0.0) {
        warn!(fps, "core reported no frame rate, assuming 60");
        fps = DEFAULT_FPS;
    }
    AvInfo {
        fps,
        sample_rate: av.timing.sample_rate,
        geometry: Geometry {
            base_width: av.geometry.base_width,
            base_height: av.geometry.base_height,
            max_width: av.geometry.max_width,
            max_height: av.geometry.max_height,
            aspect_ratio: av.geometry.aspect_ratio,
        },
    }
}
