//! Software framebuffer decoding into 8-bit RGBA.

/// `RETRO_PIXEL_FORMAT_UNKNOWN`.
pub const RAW_PIXEL_FORMAT_UNKNOWN: u32 = i32::MAX as u32;

/// Encodings a core may declare for its software framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// `0RGB1555`, native-endian 16 bit. The ABI default.
    Rgb1555,
    /// `XRGB8888`, native-endian 32 bit.
    Xrgb8888,
    /// `RGB565`, native-endian 16 bit.
    Rgb565,
}

impl PixelFormat {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rgb1555),
            1 => Some(Self::Xrgb8888),
            2 => Some(Self::Rgb565),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Rgb1555 => 0,
            Self::Xrgb8888 => 1,
            Self::Rgb565 => 2,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb1555 | Self::Rgb565 => 2,
            Self::Xrgb8888 => 4,
        }
    }

    /// Decodes one source pixel; `px` holds exactly `bytes_per_pixel` bytes.
    #[inline]
    pub fn decode(self, px: &[u8]) -> [u8; 4] {
        match self {
            Self::Xrgb8888 => {
                let v = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
                [(v >> 16) as u8, (v >> 8) as u8, v as u8, 0xFF]
            }
            Self::Rgb565 => {
                let v = u16::from_ne_bytes([px[0], px[1]]);
                [
                    expand5(((v >> 11) & 0x1F) as u8),
                    expand6(((v >> 5) & 0x3F) as u8),
                    expand5((v & 0x1F) as u8),
                    0xFF,
                ]
            }
            Self::Rgb1555 => {
                let v = u16::from_ne_bytes([px[0], px[1]]);
                [
                    expand5(((v >> 10) & 0x1F) as u8),
                    expand5(((v >> 5) & 0x1F) as u8),
                    expand5((v & 0x1F) as u8),
                    0xFF,
                ]
            }
        }
    }

    /// Minimum number of source bytes a `width`x`height` frame with `pitch` occupies.
    pub fn required_len(self, width: usize, height: usize, pitch: usize) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        pitch * (height - 1) + width * self.bytes_per_pixel()
    }
}

#[inline]
fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("pitch {pitch} is smaller than a {width}-pixel row ({row} bytes)")]
    PitchTooSmall { pitch: usize, width: usize, row: usize },
    #[error("source holds {actual} bytes but the frame needs {required}")]
    SourceTooShort { actual: usize, required: usize },
}

/// Decodes a pitched frame into tightly packed RGBA, replacing `dst`'s contents.
///
/// Rows are walked by `pitch`; any padding past `width` pixels is ignored.
pub fn convert_to_rgba(
    format: PixelFormat,
    src: &[u8],
    width: usize,
    height: usize,
    pitch: usize,
    dst: &mut Vec<u8>,
) -> Result<(), ConvertError> {
    let bpp = format.bytes_per_pixel();
    let row = width * bpp;
    if pitch < row {
        return Err(ConvertError::PitchTooSmall { pitch, width, row });
    }
    let required = format.required_len(width, height, pitch);
    if src.len() < required {
        return Err(ConvertError::SourceTooShort {
            actual: src.len(),
            required,
        });
    }

    dst.clear();
    dst.reserve(width * height * 4);
    for y in 0..height {
        let start = y * pitch;
        for px in src[start..start + row].chunks_exact(bpp) {
            dst.extend_from_slice(&format.decode(px));
        }
    }
    Ok(())
}
