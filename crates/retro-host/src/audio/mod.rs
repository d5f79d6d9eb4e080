//! Sample ingestion from the core and buffer-occupancy feedback.

pub mod device;

use rust_libretro_sys::retro_audio_buffer_status_callback_t;
use tracing::{debug, trace};

use crate::host::AudioOutput;

pub use self::device::CpalAudioBackend;

/// Occupancy at or below which the core is told an underrun is likely.
pub const UNDERRUN_LIKELY_PERCENT: u32 = 10;

const PCM_SCALE: f32 = 32768.0;

#[inline]
pub fn pcm_to_f32(sample: i16) -> f32 {
    f32::from(sample) / PCM_SCALE
}

/// Occupancy of a sink buffer whose real capacity cannot be queried.
///
/// The largest free-frame count ever seen stands in for the capacity; it only
/// ever grows, so a transient low reading cannot shrink it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingEstimate {
    capacity: usize,
    occupancy: u32,
}

impl RingEstimate {
    /// Records a free-frame reading and returns the updated occupancy.
    pub fn observe(&mut self, available: usize) -> u32 {
        self.capacity = self.capacity.max(available);
        self.occupancy = if self.capacity == 0 {
            0
        } else {
            let used = (self.capacity - available) as u128;
            ((used * 100) / self.capacity as u128).min(100) as u32
        };
        self.occupancy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Percent of the inferred capacity in use, `0..=100`.
    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn underrun_likely(&self) -> bool {
        self.occupancy <= UNDERRUN_LIKELY_PERCENT
    }
}

/// What the buffer-status callback is told before a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    pub occupancy: u32,
    pub underrun_likely: bool,
}

/// Per-session audio state living on the emulation side.
#[derive(Default)]
pub struct AudioPipeline {
    output: Option<Box<dyn AudioOutput>>,
    ring: RingEstimate,
    status_callback: retro_audio_buffer_status_callback_t,
    minimum_latency_ms: u32,
    dropped_frames: u64,
}

impl AudioPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, output: Box<dyn AudioOutput>) {
        let available = output.frames_available();
        self.output = Some(output);
        self.ring.observe(available);
        debug!(available, "audio output attached");
    }

    pub fn detach(&mut self) -> Option<Box<dyn AudioOutput>> {
        self.output.take()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn on_sample(&mut self, left: i16, right: i16) {
        match self.output.as_mut() {
            Some(output) => output.push_frame(pcm_to_f32(left), pcm_to_f32(right)),
            None => self.dropped_frames += 1,
        }
    }

    /// Forwards interleaved stereo frames and refreshes the occupancy estimate
    /// from the free space seen before the batch is queued.
    ///
    /// Returns the number of frames consumed, which is always all of them.
    pub fn on_sample_batch(&mut self, samples: &[i16]) -> usize {
        let frames = samples.len() / 2;
        let Some(output) = self.output.as_mut() else {
            self.dropped_frames += frames as u64;
            return frames;
        };
        let available = output.frames_available();
        for frame in samples.chunks_exact(2) {
            output.push_frame(pcm_to_f32(frame[0]), pcm_to_f32(frame[1]));
        }
        let occupancy = self.ring.observe(available);
        trace!(frames, available, occupancy, "audio batch");
        frames
    }

    pub fn ring(&self) -> &RingEstimate {
        &self.ring
    }

    pub fn set_status_callback(&mut self, callback: retro_audio_buffer_status_callback_t) {
        self.status_callback = callback;
    }

    pub fn clear_status_callback(&mut self) {
        self.status_callback = None;
    }

    /// The registered callback with the status to report, if one is registered.
    pub fn pending_status(&self) -> Option<(unsafe extern "C" fn(bool, u32, bool), BufferStatus)> {
        let callback = self.status_callback?;
        Some((
            callback,
            BufferStatus {
                occupancy: self.ring.occupancy(),
                underrun_likely: self.ring.underrun_likely(),
            },
        ))
    }

    pub fn set_minimum_latency(&mut self, ms: u32) {
        self.minimum_latency_ms = ms;
    }

    pub fn minimum_latency_ms(&self) -> u32 {
        self.minimum_latency_ms
    }

    /// Frames received while no output was attached.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}
