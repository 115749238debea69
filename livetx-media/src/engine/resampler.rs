//! Linear interpolation resampler
//!
//! Converts sample rate, channel count and sample format. Interpolation
//! state is carried across frames so the output is continuous; this costs
//! one input sample of latency, which [`Resampler::flush`] releases.

use super::worker::FrameProcessor;
use bytes::{Buf, BufMut, BytesMut};
use livetx_core::{
    AudioGeometry, ChannelLayout, Frame, SampleFormat, Timebase, TrackDescriptor, TranscodeError,
    TranscodeResult,
};
use tracing::debug;

/// Audio resampling processor
#[derive(Debug)]
pub struct Resampler {
    output_id: u32,
    output_rate: u32,
    output_layout: ChannelLayout,
    output_format: SampleFormat,
    input_timebase: Timebase,
    output_timebase: Timebase,

    input_rate: u32,
    ratio: f64,
    /// Position of the next output sample, relative to `prev`
    position: f64,
    /// Last input sample per output channel
    prev: Option<Vec<f32>>,
    base_pts: Option<i64>,
    emitted: i64,
}

impl Resampler {
    /// Create a resampler converting `input` into `output`
    pub fn new(input: &TrackDescriptor, output: &TrackDescriptor) -> TranscodeResult<Self> {
        if input.sample_rate == 0 || output.sample_rate == 0 {
            return Err(TranscodeError::EngineCreationFailed {
                engine: "resampler".to_string(),
                reason: format!(
                    "invalid sample rates {} -> {}",
                    input.sample_rate, output.sample_rate
                ),
            });
        }
        if output.channel_layout.count() == 0 {
            return Err(TranscodeError::EngineCreationFailed {
                engine: "resampler".to_string(),
                reason: "output has no channels".to_string(),
            });
        }

        Ok(Self {
            output_id: output.id,
            output_rate: output.sample_rate,
            output_layout: output.channel_layout,
            output_format: output.sample_format,
            input_timebase: input.timebase,
            output_timebase: output.timebase,
            input_rate: input.sample_rate,
            ratio: input.sample_rate as f64 / output.sample_rate as f64,
            position: 0.0,
            prev: None,
            base_pts: None,
            emitted: 0,
        })
    }

    /// Resample one audio frame
    pub fn process(&mut self, frame: Frame) -> TranscodeResult<Vec<Frame>> {
        let Some(geometry) = frame.audio_geometry().copied() else {
            return Err(TranscodeError::InvalidFrame {
                reason: "resampler received a video frame".to_string(),
            });
        };
        if !frame.is_consistent() || geometry.sample_rate == 0 {
            return Err(TranscodeError::InvalidFrame {
                reason: format!("audio payload does not match {:?}", geometry),
            });
        }

        if geometry.sample_rate != self.input_rate {
            debug!(
                from = self.input_rate,
                to = geometry.sample_rate,
                "Input sample rate changed, resetting interpolation"
            );
            self.input_rate = geometry.sample_rate;
            self.ratio = geometry.sample_rate as f64 / self.output_rate as f64;
            self.position = 0.0;
            self.prev = None;
        }

        if self.base_pts.is_none() {
            let pts = frame.pts.unwrap_or(0);
            self.base_pts = Some(self.input_timebase.rescale(pts, self.output_timebase));
        }

        let input_channels = geometry.channel_layout.count() as usize;
        let decoded = decode_samples(&frame.data, geometry.sample_format, geometry.samples * input_channels);
        let mixed = remix(&decoded, input_channels, self.output_layout.count() as usize);
        let resampled = self.interpolate(&mixed);

        Ok(self.emit(resampled).into_iter().collect())
    }

    /// Release the sample held back for interpolation
    pub fn flush(&mut self) -> Vec<Frame> {
        let Some(prev) = self.prev.take() else {
            return Vec::new();
        };

        let mut held = Vec::new();
        while self.position < 1.0 {
            held.extend_from_slice(&prev);
            self.position += self.ratio;
        }
        self.position = 0.0;

        self.emit(held).into_iter().collect()
    }

    fn interpolate(&mut self, input: &[f32]) -> Vec<f32> {
        let channels = self.output_layout.count() as usize;
        let frames = input.len() / channels;
        if frames == 0 {
            return Vec::new();
        }

        let prev = self.prev.take();
        let offset = usize::from(prev.is_some());
        let sample = |index: usize, channel: usize| -> f32 {
            match &prev {
                Some(prev) if index == 0 => prev[channel],
                _ => input[(index - offset) * channels + channel],
            }
        };

        let total = frames + offset;
        let mut output = Vec::with_capacity(((frames as f64 / self.ratio).ceil() as usize + 1) * channels);
        let mut pos = self.position;
        while pos < (total - 1) as f64 {
            let index = pos as usize;
            let frac = (pos - index as f64) as f32;
            for channel in 0..channels {
                let a = sample(index, channel);
                let b = sample(index + 1, channel);
                output.push(a + (b - a) * frac);
            }
            pos += self.ratio;
        }

        self.position = pos - (total - 1) as f64;
        self.prev = Some(input[(frames - 1) * channels..frames * channels].to_vec());
        output
    }

    fn emit(&mut self, samples: Vec<f32>) -> Option<Frame> {
        let channels = self.output_layout.count() as usize;
        let count = samples.len() / channels;
        if count == 0 {
            return None;
        }

        let base = self.base_pts.unwrap_or(0);
        let pts = base + self.output_timebase.ticks_for(self.emitted, self.output_rate as i64);
        self.emitted += count as i64;
        let end = base + self.output_timebase.ticks_for(self.emitted, self.output_rate as i64);

        let geometry = AudioGeometry {
            sample_format: self.output_format,
            channel_layout: self.output_layout,
            samples: count,
            sample_rate: self.output_rate,
        };
        let data = encode_samples(&samples, self.output_format);
        Some(
            Frame::audio(self.output_id, geometry, data)
                .with_pts(pts)
                .with_duration(end - pts),
        )
    }
}

impl FrameProcessor for Resampler {
    fn process(&mut self, frame: Frame) -> TranscodeResult<Vec<Frame>> {
        Resampler::process(self, frame)
    }

    fn flush(&mut self) -> Vec<Frame> {
        Resampler::flush(self)
    }
}

fn decode_samples(mut data: &[u8], format: SampleFormat, count: usize) -> Vec<f32> {
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match format {
            SampleFormat::U8 => (data.get_u8() as f32 - 128.0) / 128.0,
            SampleFormat::S16 => data.get_i16_le() as f32 / 32768.0,
            SampleFormat::S32 => (data.get_i32_le() as f64 / 2_147_483_648.0) as f32,
            SampleFormat::F32 => data.get_f32_le(),
            SampleFormat::F64 => data.get_f64_le() as f32,
        };
        samples.push(value);
    }
    samples
}

fn encode_samples(samples: &[f32], format: SampleFormat) -> BytesMut {
    let mut out = BytesMut::with_capacity(samples.len() * format.bytes_per_sample());
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        match format {
            SampleFormat::U8 => out.put_u8((s * 127.0 + 128.0).round() as u8),
            SampleFormat::S16 => out.put_i16_le((s * 32767.0).round() as i16),
            SampleFormat::S32 => out.put_i32_le((s as f64 * 2_147_483_647.0).round() as i32),
            SampleFormat::F32 => out.put_f32_le(sample),
            SampleFormat::F64 => out.put_f64_le(sample as f64),
        }
    }
    out
}

/// Map interleaved samples between channel counts
///
/// Downmix to mono averages, any other change repeats input channels
/// cyclically.
fn remix(samples: &[f32], input: usize, output: usize) -> Vec<f32> {
    if input == output || input == 0 {
        return samples.to_vec();
    }

    let mut mixed = Vec::with_capacity(samples.len() / input * output);
    for frame in samples.chunks_exact(input) {
        if output == 1 {
            mixed.push(frame.iter().sum::<f32>() / input as f32);
        } else {
            mixed.extend((0..output).map(|channel| frame[channel % input]));
        }
    }
    mixed
}
