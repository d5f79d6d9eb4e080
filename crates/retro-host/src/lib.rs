pub mod audio;
pub mod config;
pub mod environment;
pub mod error;
mod ffi;
pub mod host;
pub mod input;
pub mod loader;
pub mod options;
pub mod queue;
pub mod session;
pub mod video;

#[cfg(test)]
mod test_util;

pub use rust_libretro_sys as sys;

pub use audio::CpalAudioBackend;
pub use config::{CoreLogLevel, FrontendConfig};
pub use error::{LoadError, SessionError};
pub use host::{
    AudioBackend, AudioOutput, FrameSlot, GlContext, GlContextFactory, GlProfile, GlRequest, Host,
    ImageFormat, NullAudioBackend, NullAudioOutput, RgbaImage, VideoSink,
};
pub use input::{InputState, KeyEvent, RumbleMotor, Stick};
pub use loader::{CoreApi, ModuleHandle, ModuleLoader};
pub use options::{OptionDefinition, OptionsSnapshot};
pub use session::{
    AvInfo, Session, SessionEvent, SessionState, StopReason,
    pacing::{Clock, MonotonicClock},
};
