//! Frame ingestion: pixel-format negotiation, conversion and HW readback.

pub mod convert;

use std::ffi::c_void;

use rust_libretro_sys::retro_hw_context_reset_t;
use tracing::{debug, info, warn};

use crate::{
    host::{GlContext, GlProfile, GlRequest, ImageFormat},
    queue::DeferredCommand,
};

pub use self::convert::{ConvertError, PixelFormat, RAW_PIXEL_FORMAT_UNKNOWN, convert_to_rgba};

/// `RETRO_HW_FRAME_BUFFER_VALID`: the frame is in the GL default framebuffer.
pub const HW_FRAME_BUFFER_VALID: *const c_void = -1isize as *const c_void;

const RAW_HW_CONTEXT_OPENGL: u32 = 1;
const RAW_HW_CONTEXT_OPENGL_CORE: u32 = 3;

/// Context type answered to GET_PREFERRED_HW_RENDER.
pub const PREFERRED_HW_CONTEXT: u32 = RAW_HW_CONTEXT_OPENGL_CORE;

/// Maps a raw `retro_hw_context_type` onto a supported GL profile.
pub fn gl_profile_from_raw(raw: u32) -> Option<GlProfile> {
    match raw {
        RAW_HW_CONTEXT_OPENGL => Some(GlProfile::Compatibility),
        RAW_HW_CONTEXT_OPENGL_CORE => Some(GlProfile::Core),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub base_width: u32,
    pub base_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub aspect_ratio: f32,
}

/// Hardware rendering the core registered through SET_HW_RENDER.
#[derive(Debug, Clone, Copy)]
pub struct HwRender {
    pub request: GlRequest,
    pub context_reset: retro_hw_context_reset_t,
    pub context_destroy: retro_hw_context_reset_t,
}

/// Where a refreshed frame comes from.
pub enum FrameSource<'a> {
    /// The core repeats the previous frame.
    Duplicate,
    Software { data: &'a [u8], pitch: usize },
    /// Read back from the default framebuffer of the bound GL context.
    Hardware(&'a mut dyn GlContext),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Software(PixelFormat),
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameShape {
    kind: FrameKind,
    width: u32,
    height: u32,
}

#[derive(Default)]
pub struct VideoPipeline {
    format: Option<PixelFormat>,
    warned_default_format: bool,
    shape: Option<FrameShape>,
    rgba: Vec<u8>,
    hw: Option<HwRender>,
    geometry: Option<Geometry>,
    rotation: u32,
    frames: u64,
}

impl VideoPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one of the three convertible encodings.
    pub fn set_pixel_format(&mut self, raw: u32) -> bool {
        match PixelFormat::from_raw(raw) {
            Some(format) => {
                debug!(?format, "pixel format negotiated");
                self.format = Some(format);
                true
            }
            None => {
                warn!(raw, "rejected pixel format");
                false
            }
        }
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.format
    }

    /// Negotiated format, or the ABI default if the core never declared one.
    pub fn software_format(&mut self) -> PixelFormat {
        match self.format {
            Some(format) => format,
            None => {
                if !self.warned_default_format {
                    warn!("core sent a frame before declaring a pixel format, assuming 0RGB1555");
                    self.warned_default_format = true;
                }
                PixelFormat::Rgb1555
            }
        }
    }

    pub fn set_hw_render(&mut self, hw: HwRender) {
        info!(
            profile = ?hw.request.profile,
            major = hw.request.version_major,
            minor = hw.request.version_minor,
            depth = hw.request.depth,
            stencil = hw.request.stencil,
            "hardware rendering requested"
        );
        self.hw = Some(hw);
    }

    pub fn hw_render(&self) -> Option<&HwRender> {
        self.hw.as_ref()
    }

    /// True when the core registered a context-reset callback.
    pub fn needs_gl_context(&self) -> bool {
        self.hw.is_some_and(|hw| hw.context_reset.is_some())
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = Some(geometry);
    }

    /// Applies SET_GEOMETRY: base size and aspect change, the maximum stays.
    pub fn update_geometry(&mut self, base_width: u32, base_height: u32, aspect_ratio: f32) {
        let mut geometry = self.geometry.unwrap_or(Geometry {
            base_width,
            base_height,
            max_width: base_width,
            max_height: base_height,
            aspect_ratio,
        });
        geometry.base_width = base_width;
        geometry.base_height = base_height;
        geometry.aspect_ratio = aspect_ratio;
        self.geometry = Some(geometry);
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn set_rotation(&mut self, rotation: u32) {
        self.rotation = rotation;
    }

    /// Rotation in steps of 90 degrees counter-clockwise.
    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    /// Frames accepted so far, duplicates excluded.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Handles one video refresh and returns the host work it needs.
    ///
    /// A new image is requested whenever the source kind, pixel format or
    /// dimensions differ from the previous accepted frame.
    pub fn on_refresh(
        &mut self,
        source: FrameSource<'_>,
        width: u32,
        height: u32,
    ) -> Option<DeferredCommand> {
        if width == 0 || height == 0 {
            return None;
        }
        let kind = match source {
            FrameSource::Duplicate => return None,
            FrameSource::Software { data, pitch } => {
                let format = self.software_format();
                if let Err(err) = convert_to_rgba(
                    format,
                    data,
                    width as usize,
                    height as usize,
                    pitch,
                    &mut self.rgba,
                ) {
                    warn!(%err, width, height, pitch, "dropping malformed frame");
                    return None;
                }
                FrameKind::Software(format)
            }
            FrameSource::Hardware(gl) => {
                if !gl.read_default_framebuffer(width, height, &mut self.rgba)
                    || self.rgba.len() != width as usize * height as usize * 4
                {
                    warn!(width, height, "framebuffer readback failed");
                    return None;
                }
                gl.swap_buffers();
                FrameKind::Hardware
            }
        };

        self.frames += 1;
        let flip_y = kind == FrameKind::Hardware;
        let shape = FrameShape {
            kind,
            width,
            height,
        };
        let pixels = self.rgba.clone();
        if self.shape == Some(shape) {
            Some(DeferredCommand::UpdateTexture { pixels, flip_y })
        } else {
            debug!(width, height, ?kind, "display image (re)created");
            self.shape = Some(shape);
            Some(DeferredCommand::CreateTexture {
                width,
                height,
                format: ImageFormat::Rgba8,
                pixels,
                flip_y,
            })
        }
    }
}
