//! The emulation thread: HW context setup, audio handshake, paced loop, teardown.

use std::{
    ffi::CString,
    sync::{Arc, atomic::Ordering},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, info, trace};

use super::{
    Control, SessionError, SessionState,
    context::SessionContext,
    pacing::{self, Clock, FramePacer},
};
use crate::{
    ffi::{self, ContextScope},
    host::{GlContext, GlContextFactory},
    loader::ModuleHandle,
};

const SPIN_YIELD_EVERY: u32 = 512;
// Waits longer than this are spent yielding rather than spinning.
const YIELD_THRESHOLD: Duration = Duration::from_micros(500);

/// Content bytes and path handed to `retro_load_game`; kept alive until unload.
pub(crate) struct LoadedContent {
    pub(crate) path: Option<CString>,
    pub(crate) data: Option<Vec<u8>>,
}

/// What the host thread hands the emulation thread.
pub(crate) struct RunnerParts {
    pub(crate) ctx: Arc<SessionContext>,
    pub(crate) module: ModuleHandle,
    pub(crate) content: LoadedContent,
    pub(crate) control: Receiver<Control>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) fps: f64,
    pub(crate) sample_rate: f64,
    pub(crate) gl: Option<Box<dyn GlContextFactory>>,
    /// Receives the outcome of HW context setup.
    pub(crate) startup: Sender<Result<(), SessionError>>,
}

pub(crate) struct Runner {
    ctx: Arc<SessionContext>,
    module: ModuleHandle,
    _content: LoadedContent,
    control: Receiver<Control>,
    clock: Box<dyn Clock>,
    pacer: FramePacer,
    sample_rate: f64,
    gl: Option<Box<dyn GlContextFactory>>,
    startup: Option<Sender<Result<(), SessionError>>>,
    hw_active: bool,
    last_frame: Option<Duration>,
}

impl Runner {
    pub(crate) fn new(parts: RunnerParts) -> Self {
        let pacer = FramePacer::new(parts.fps, parts.clock.now());
        Self {
            ctx: parts.ctx,
            module: parts.module,
            _content: parts.content,
            control: parts.control,
            clock: parts.clock,
            pacer,
            sample_rate: parts.sample_rate,
            gl: parts.gl,
            startup: Some(parts.startup),
            hw_active: false,
            last_frame: None,
        }
    }

    /// Thread body. Hands the GL factory back so the host can reuse it.
    pub(crate) fn run(mut self) -> Option<Box<dyn GlContextFactory>> {
        let _scope = ContextScope::enter(Arc::clone(&self.ctx));

        let init = self.init_hw_context();
        let started = init.is_ok();
        if let Some(startup) = self.startup.take() {
            let _ = startup.send(init);
        }
        if started && self.audio_handshake() {
            self.ctx.set_state(SessionState::Running);
            info!(
                core = %self.ctx.core_name,
                frame = ?self.pacer.frame_duration(),
                "emulation running"
            );
            self.run_loop();
        }
        self.teardown();
        self.gl.take()
    }

    fn init_hw_context(&mut self) -> Result<(), SessionError> {
        let hw = self.ctx.video.lock().hw_render().copied();
        let Some(hw) = hw.filter(|hw| hw.context_reset.is_some()) else {
            return Ok(());
        };
        self.ctx.set_state(SessionState::HwContextInit);
        let geometry = self.ctx.video.lock().geometry();
        let (width, height) = geometry.map_or((0, 0), |g| (g.base_width, g.base_height));
        let factory = self.gl.as_mut().ok_or(SessionError::NoGlContextProvider)?;
        let mut context: Box<dyn GlContext> = factory
            .create(width, height, &hw.request)
            .map_err(SessionError::GlContext)?;
        if !context.make_current() {
            return Err(SessionError::GlContext("make_current failed".into()));
        }
        ffi::install_gl_context(context);
        self.hw_active = true;
        info!(width, height, profile = ?hw.request.profile, "GL context created");
        if let Some(reset) = hw.context_reset {
            // SAFETY: the core registered this callback and is loaded.
            unsafe { reset() };
        }
        Ok(())
    }

    /// Blocks until the host opened the audio device; false if stopped meanwhile.
    fn audio_handshake(&mut self) -> bool {
        self.ctx.set_state(SessionState::AudioHandshake);
        let output = self.ctx.commands.request_audio(
            self.sample_rate,
            self.ctx.config.audio_buffer_secs,
            &self.ctx.running,
        );
        match output {
            Some(output) => {
                self.ctx.audio.lock().attach(output);
                true
            }
            None => {
                debug!("audio handshake abandoned");
                false
            }
        }
    }

    fn run_loop(&mut self) {
        let mut spins: u32 = 0;
        while self.ctx.is_running() {
            let now = self.clock.now();
            let due = self.pacer.advance(now);
            if due == 0 {
                if self.pacer.until_next(now) > YIELD_THRESHOLD {
                    thread::yield_now();
                } else {
                    std::hint::spin_loop();
                    spins = spins.wrapping_add(1);
                    if spins.is_multiple_of(SPIN_YIELD_EVERY) {
                        thread::yield_now();
                    }
                }
                continue;
            }
            let frame = self.pacer.frame_duration();
            for instant in pacing::burst_instants(now, frame, due) {
                if !self.ctx.is_running() {
                    break;
                }
                self.step(instant);
            }
        }
    }

    /// Runs one core frame with everything that has to precede it.
    fn step(&mut self, now: Duration) {
        self.apply_controls();
        self.report_frame_time(now);
        let status = self.ctx.audio.lock().pending_status();
        if let Some((callback, status)) = status {
            // SAFETY: registered by the core through the environment.
            unsafe { callback(true, status.occupancy, status.underrun_likely) };
        }
        // SAFETY: the module is loaded and initialized for the runner's lifetime.
        unsafe { (self.module.api().retro_run)() };
    }

    fn apply_controls(&mut self) {
        loop {
            let control = match self.control.try_recv() {
                Ok(control) => control,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return,
            };
            match control {
                Control::Key(event) => {
                    let callback = self.ctx.env.lock().keyboard_callback;
                    if let Some(callback) = callback {
                        // SAFETY: registered by the core through the environment.
                        unsafe { callback(event.down, event.keycode, event.character, event.modifiers) };
                    }
                }
                Control::ControllerDevice { port, device } => {
                    debug!(port, device, "controller port device");
                    // SAFETY: plain call into the loaded module.
                    unsafe { (self.module.api().retro_set_controller_port_device)(port, device) };
                }
                Control::RefreshOptionDisplay => {
                    let callback = self.ctx.env.lock().update_display;
                    if let Some(callback) = callback {
                        // SAFETY: registered by the core through the environment.
                        let changed = unsafe { callback() };
                        trace!(changed, "option display refreshed");
                    }
                }
            }
        }
    }

    fn report_frame_time(&mut self, now: Duration) {
        let frame_time = self.ctx.env.lock().frame_time;
        let Some(frame_time) = frame_time else {
            return;
        };
        let delta = match self.last_frame {
            Some(last) => now.saturating_sub(last).as_micros() as i64,
            None => frame_time.reference,
        };
        self.last_frame = Some(now);
        // SAFETY: registered by the core through the environment.
        unsafe { (frame_time.callback)(delta) };
    }

    /// Context destroy, unload game, deinit; then the GL context and audio go.
    fn teardown(&mut self) {
        self.ctx.set_state(SessionState::Stopping);
        self.ctx.running.store(false, Ordering::Release);
        if self.hw_active {
            let destroy = self.ctx.video.lock().hw_render().and_then(|hw| hw.context_destroy);
            if let Some(destroy) = destroy {
                // SAFETY: registered by the core; its context is still current.
                unsafe { destroy() };
            }
        }
        // SAFETY: the module is still loaded; these are its final calls.
        unsafe {
            (self.module.api().retro_unload_game)();
            (self.module.api().retro_deinit)();
        }
        if ffi::take_gl_context().is_some() {
            debug!("GL context released");
        }
        self.hw_active = false;
        if self.ctx.audio.lock().detach().is_some() {
            debug!("audio output released");
        }
        info!(core = %self.ctx.core_name, "core shut down");
    }
}
