//! Default output device playback through cpal.
//!
//! The emulation thread pushes frames into a lock-free SPSC ring; the cpal
//! callback drains it and resamples linearly from the core rate to the
//! device rate.

use anyhow::{Context, Result};
use cpal::{
    FromSample, Sample, SampleFormat, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use tracing::{info, warn};

use crate::host::{AudioBackend, AudioOutput};

/// Stateful linear interpolator over a stream of stereo frames.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input frames consumed per output frame.
    step: f64,
    position: f64,
    current: [f32; 2],
    next: [f32; 2],
}

impl LinearResampler {
    pub fn new(input_rate: f64, output_rate: f64) -> Self {
        let step = if input_rate > 0.0 && output_rate > 0.0 {
            input_rate / output_rate
        } else {
            1.0
        };
        Self {
            step,
            position: 1.0,
            current: [0.0; 2],
            next: [0.0; 2],
        }
    }

    /// Produces one output frame, pulling input frames from `pull` as needed.
    ///
    /// When the input runs dry the last frame is held.
    pub fn next_frame(&mut self, mut pull: impl FnMut() -> Option<[f32; 2]>) -> [f32; 2] {
        while self.position >= 1.0 {
            self.current = self.next;
            if let Some(frame) = pull() {
                self.next = frame;
            }
            self.position -= 1.0;
        }
        let t = self.position as f32;
        let out = [
            self.current[0] + (self.next[0] - self.current[0]) * t,
            self.current[1] + (self.next[1] - self.current[1]) * t,
        ];
        self.position += self.step;
        out
    }
}

/// Producer end of the ring handed to the emulation thread.
struct RingOutput {
    producer: HeapProd<f32>,
}

impl AudioOutput for RingOutput {
    fn push_frame(&mut self, left: f32, right: f32) {
        // Keep channels paired: drop the whole frame if it does not fit.
        if self.producer.vacant_len() >= 2 {
            let _ = self.producer.try_push(left.clamp(-1.0, 1.0));
            let _ = self.producer.try_push(right.clamp(-1.0, 1.0));
        }
    }

    fn frames_available(&self) -> usize {
        self.producer.vacant_len() / 2
    }
}

/// Writes one stereo frame across a device frame of any channel count.
///
/// Mono devices get the downmix; extra channels repeat the right one.
fn write_frame<T>(out: &mut [T], left: f32, right: f32)
where
    T: Sample + FromSample<f32>,
{
    match out.len() {
        0 => {}
        1 => out[0] = ((left + right) * 0.5).to_sample::<T>(),
        _ => {
            let right = right.to_sample::<T>();
            out[0] = left.to_sample::<T>();
            out[1] = right;
            for ch in &mut out[2..] {
                *ch = right;
            }
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    mut resampler: LinearResampler,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels).max(1);
    let err_fn = |err| warn!(%err, "audio stream error");
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                for out in data.chunks_mut(channels) {
                    let [left, right] = resampler.next_frame(|| {
                        if consumer.occupied_len() < 2 {
                            return None;
                        }
                        let left = consumer.try_pop()?;
                        let right = consumer.try_pop().unwrap_or(left);
                        Some([left, right])
                    });
                    write_frame(out, left, right);
                }
            },
            err_fn,
            None,
        )
        .context("failed to build output stream")?;
    Ok(stream)
}

/// [`AudioBackend`] playing on the default output device.
///
/// The stream itself stays with the backend on the host thread.
#[derive(Default)]
pub struct CpalAudioBackend {
    stream: Option<cpal::Stream>,
}

impl CpalAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for CpalAudioBackend {
    fn open(&mut self, sample_rate: f64, buffer_secs: f32) -> Result<Box<dyn AudioOutput>> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no default output device")?;
        let supported_config = device
            .default_output_config()
            .context("no default output config")?;

        let sample_format = supported_config.sample_format();
        let config: cpal::StreamConfig = supported_config.into();
        let device_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        // Interleaved stereo at the core's rate.
        let frames = (sample_rate * f64::from(buffer_secs)).ceil().max(1.0) as usize;
        let (producer, consumer) = HeapRb::<f32>::new(frames * 2).split();
        let resampler = LinearResampler::new(sample_rate, f64::from(device_rate));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, resampler)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, resampler)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, resampler)?,
            other => anyhow::bail!("unsupported sample format {other:?}"),
        };
        stream.play().context("failed to start output stream")?;

        info!(
            core_rate = sample_rate,
            device_rate, channels, frames, ?sample_format, "audio device opened"
        );
        self.stream = Some(stream);
        Ok(Box::new(RingOutput { producer }))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!(%err, "failed to pause output stream");
            }
            info!("audio device closed");
        }
    }
}
