use std::path::PathBuf;

use clap::Parser;
use retro_host::CoreLogLevel;
use tracing::Level;

/// Headless libretro host
#[derive(Parser, Debug)]
#[command(name = "retro-host", author, version, about, long_about = None)]
pub struct Args {
    /// Path to the core module (`*_libretro.so`, `.dylib` or `.dll`)
    pub core: PathBuf,

    /// Content file; omit for cores that run without content
    pub content: Option<PathBuf>,

    /// Data root for system, save, core asset and option files
    #[arg(long, default_value = "retro-host-data")]
    pub root: PathBuf,

    /// Stop after this many seconds; runs until the core shuts down when omitted
    #[arg(long)]
    pub seconds: Option<f64>,

    /// Frontend log level (overridden by RUST_LOG)
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Lowest core log level that is printed
    #[arg(long, default_value_t = CoreLogLevel::Warn)]
    pub core_log_level: CoreLogLevel,

    /// Discard audio instead of opening the default output device
    #[arg(long)]
    pub no_audio: bool,

    /// Write the last displayed frame to this PNG file on exit
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}
