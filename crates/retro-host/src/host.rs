//! Interfaces the runtime needs from its embedding host.
//!
//! The session calls [`VideoSink`] and [`AudioBackend`] only from the thread
//! that calls [`Session::tick`](crate::session::Session::tick). An
//! [`AudioOutput`] and the [`GlContextFactory`] move to the emulation thread.

use std::{
    ffi::{CStr, c_void},
    sync::Arc,
};

use parking_lot::Mutex;

/// Layout of image bytes handed to a [`VideoSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Tightly packed 8-bit RGBA, four bytes per pixel.
    Rgba8,
}

/// Receives converted frames on the host thread.
pub trait VideoSink {
    /// (Re)allocates the display image. Called when format or dimensions change.
    fn create_image(
        &mut self,
        width: u32,
        height: u32,
        format: ImageFormat,
        pixels: &[u8],
        flip_y: bool,
    );

    /// Overwrites the current image in place.
    fn update_image(&mut self, pixels: &[u8], flip_y: bool);
}

/// A displayed image, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// [`VideoSink`] that keeps the latest frame in memory, rows already un-flipped.
///
/// Clones share the same slot, so the host can hand one clone to the session
/// and read frames from another.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<RgbaImage>>>,
    images_created: Arc<Mutex<u64>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<RgbaImage> {
        self.inner.lock().clone()
    }

    /// How many times the image was (re)allocated.
    pub fn images_created(&self) -> u64 {
        *self.images_created.lock()
    }

    fn store(&self, width: u32, height: u32, pixels: &[u8], flip_y: bool) {
        let row = width as usize * 4;
        let mut data = Vec::with_capacity(pixels.len());
        if flip_y && row > 0 {
            for line in pixels.chunks_exact(row).rev() {
                data.extend_from_slice(line);
            }
        } else {
            data.extend_from_slice(pixels);
        }
        *self.inner.lock() = Some(RgbaImage {
            width,
            height,
            pixels: data,
        });
    }
}

impl VideoSink for FrameSlot {
    fn create_image(
        &mut self,
        width: u32,
        height: u32,
        _format: ImageFormat,
        pixels: &[u8],
        flip_y: bool,
    ) {
        *self.images_created.lock() += 1;
        self.store(width, height, pixels, flip_y);
    }

    fn update_image(&mut self, pixels: &[u8], flip_y: bool) {
        let dims = self.inner.lock().as_ref().map(|img| (img.width, img.height));
        if let Some((width, height)) = dims {
            self.store(width, height, pixels, flip_y);
        }
    }
}

/// Stereo sample sink used from the emulation thread.
pub trait AudioOutput: Send {
    /// Queues one stereo frame in `[-1.0, 1.0]`. Frames that do not fit are dropped.
    fn push_frame(&mut self, left: f32, right: f32);

    /// Frames that can currently be queued without dropping.
    fn frames_available(&self) -> usize;
}

/// Owns the host audio device.
pub trait AudioBackend {
    /// Opens the device for `sample_rate` Hz input with roughly `buffer_secs` of buffering.
    fn open(&mut self, sample_rate: f64, buffer_secs: f32) -> anyhow::Result<Box<dyn AudioOutput>>;

    /// Stops playback and releases the device.
    fn close(&mut self);
}

/// Discards everything; the buffer always looks empty.
#[derive(Debug, Clone, Copy)]
pub struct NullAudioOutput {
    capacity: usize,
}

impl NullAudioOutput {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl AudioOutput for NullAudioOutput {
    fn push_frame(&mut self, _left: f32, _right: f32) {}

    fn frames_available(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Default)]
pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn open(&mut self, sample_rate: f64, buffer_secs: f32) -> anyhow::Result<Box<dyn AudioOutput>> {
        let frames = (sample_rate * f64::from(buffer_secs)).ceil().max(1.0) as usize;
        Ok(Box::new(NullAudioOutput::new(frames)))
    }

    fn close(&mut self) {}
}

/// GL profile a core asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlProfile {
    /// Compatibility context (`RETRO_HW_CONTEXT_OPENGL`).
    Compatibility,
    /// Core profile (`RETRO_HW_CONTEXT_OPENGL_CORE`) at the requested version.
    Core,
}

/// Parameters of the GL context a hardware-rendering core needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlRequest {
    pub profile: GlProfile,
    pub version_major: u32,
    pub version_minor: u32,
    pub depth: bool,
    pub stencil: bool,
    pub bottom_left_origin: bool,
}

/// A GL context bound to the emulation thread. Dropping it destroys the context.
pub trait GlContext {
    fn make_current(&mut self) -> bool;

    fn swap_buffers(&mut self);

    /// Address of a GL entry point, or null.
    fn proc_address(&self, name: &CStr) -> *const c_void;

    /// Reads the default framebuffer as RGBA8, bottom row first, into `dst`.
    fn read_default_framebuffer(&mut self, width: u32, height: u32, dst: &mut Vec<u8>) -> bool;
}

/// Creates the GL context on the emulation thread.
pub trait GlContextFactory: Send {
    fn create(
        &mut self,
        width: u32,
        height: u32,
        request: &GlRequest,
    ) -> Result<Box<dyn GlContext>, String>;
}

/// Everything the host lends a session.
pub struct Host {
    pub video: Box<dyn VideoSink>,
    pub audio: Box<dyn AudioBackend>,
    pub gl: Option<Box<dyn GlContextFactory>>,
}

impl Host {
    pub fn new(video: impl VideoSink + 'static, audio: impl AudioBackend + 'static) -> Self {
        Self {
            video: Box::new(video),
            audio: Box::new(audio),
            gl: None,
        }
    }

    pub fn with_gl(mut self, gl: impl GlContextFactory + 'static) -> Self {
        self.gl = Some(Box::new(gl));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_slot_unflips_bottom_up_images() {
        let mut slot = FrameSlot::new();
        let reader = slot.clone();
        let pixels: Vec<u8> = (0..16).collect();
        slot.create_image(2, 2, ImageFormat::Rgba8, &pixels, true);

        let image = reader.latest().expect("image");
        assert_eq!(&image.pixels[..8], &pixels[8..]);
        assert_eq!(&image.pixels[8..], &pixels[..8]);
        assert_eq!(reader.images_created(), 1);

        slot.update_image(&pixels, false);
        assert_eq!(reader.latest().expect("image").pixels, pixels);
        assert_eq!(reader.images_created(), 1);
    }

    #[test]
    fn update_without_image_is_ignored() {
        let mut slot = FrameSlot::new();
        slot.update_image(&[0; 16], false);
        assert!(slot.latest().is_none());
    }

    #[test]
    fn null_backend_reports_whole_buffer_free() {
        let mut backend = NullAudioBackend;
        let mut output = backend.open(48_000.0, 0.1).expect("open");
        output.push_frame(0.5, -0.5);
        assert_eq!(output.frames_available(), 4800);
    }
}
