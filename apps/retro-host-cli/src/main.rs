mod args;

use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use retro_host::{
    AudioBackend, CpalAudioBackend, FrameSlot, FrontendConfig, Host, NullAudioBackend, RgbaImage,
    Session, SessionEvent,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::args::Args;

/// Interval between host ticks.
const TICK: Duration = Duration::from_millis(16);

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str().to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let mut config = FrontendConfig::new(&args.root);
    config.core_log_level = args.core_log_level;

    let frames = FrameSlot::new();
    let audio: Box<dyn AudioBackend> = if args.no_audio {
        Box::new(NullAudioBackend)
    } else {
        Box::new(CpalAudioBackend::new())
    };
    let host = Host {
        video: Box::new(frames.clone()),
        audio,
        gl: None,
    };

    let mut session = Session::new(config, host);
    session
        .start(&args.core, args.content.as_deref())
        .with_context(|| format!("failed to start {}", args.core.display()))?;
    if let Some(av) = session.av_info() {
        info!(
            fps = av.fps,
            sample_rate = av.sample_rate,
            width = av.geometry.base_width,
            height = av.geometry.base_height,
            "running"
        );
    }

    let deadline = args
        .seconds
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    while session.is_active() {
        session.tick();
        report_events(&session);
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            session.stop();
            break;
        }
        thread::sleep(TICK);
    }
    report_events(&session);

    if let Some(output) = &args.output {
        match frames.latest() {
            Some(image) => {
                write_png(output, &image)?;
                info!(path = %output.display(), width = image.width, height = image.height, "frame written");
            }
            None => warn!("no frame was displayed, nothing written"),
        }
    }
    Ok(())
}

fn report_events(session: &Session) {
    for event in session.events().try_iter() {
        match event {
            SessionEvent::Message { text, frames } => info!(frames, "core message: {text}"),
            SessionEvent::Stopped { reason } => info!(?reason, "core stopped"),
        }
    }
}

fn write_png(path: &Path, image: &RgbaImage) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width, image.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("failed to write PNG header")?;
    writer
        .write_image_data(&image.pixels)
        .context("failed to write PNG data")?;
    Ok(())
}
