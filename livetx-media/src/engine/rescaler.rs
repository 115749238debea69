//! Nearest-neighbour rescaler
//!
//! Scales pictures plane by plane in their source pixel format, then
//! converts to the output format when one of the supported conversions
//! applies.

use super::worker::FrameProcessor;
use livetx_core::{
    Frame, PixelFormat, Timebase, TrackDescriptor, TranscodeError, TranscodeResult, VideoGeometry,
};

/// Check if the rescaler can convert `from` into `to`
pub fn supports_conversion(from: PixelFormat, to: PixelFormat) -> bool {
    from == to
        || matches!(
            (from, to),
            (PixelFormat::Yuv420p, PixelFormat::Rgba)
                | (PixelFormat::Yuv420p, PixelFormat::Bgra)
                | (PixelFormat::Rgba, PixelFormat::Bgra)
                | (PixelFormat::Bgra, PixelFormat::Rgba)
        )
}

/// Video rescaling processor
#[derive(Debug)]
pub struct Rescaler {
    output_id: u32,
    output: VideoGeometry,
    input_timebase: Timebase,
    output_timebase: Timebase,
}

impl Rescaler {
    /// Create a rescaler converting `input` into `output`
    pub fn new(input: &TrackDescriptor, output: &TrackDescriptor) -> TranscodeResult<Self> {
        if output.width == 0 || output.height == 0 {
            return Err(TranscodeError::EngineCreationFailed {
                engine: "rescaler".to_string(),
                reason: format!("invalid output size {}x{}", output.width, output.height),
            });
        }
        if !supports_conversion(input.pixel_format, output.pixel_format) {
            return Err(TranscodeError::EngineCreationFailed {
                engine: "rescaler".to_string(),
                reason: format!(
                    "no conversion from {:?} to {:?}",
                    input.pixel_format, output.pixel_format
                ),
            });
        }

        Ok(Self {
            output_id: output.id,
            output: VideoGeometry {
                pixel_format: output.pixel_format,
                width: output.width,
                height: output.height,
            },
            input_timebase: input.timebase,
            output_timebase: output.timebase,
        })
    }

    /// Geometry of emitted frames
    pub fn output_geometry(&self) -> VideoGeometry {
        self.output
    }

    /// Rescale one video frame
    pub fn process(&mut self, frame: Frame) -> TranscodeResult<Vec<Frame>> {
        let Some(source) = frame.video_geometry().copied() else {
            return Err(TranscodeError::InvalidFrame {
                reason: "rescaler received an audio frame".to_string(),
            });
        };
        if !frame.is_consistent() || source.width == 0 || source.height == 0 {
            return Err(TranscodeError::InvalidFrame {
                reason: format!("video payload does not match {:?}", source),
            });
        }
        if !supports_conversion(source.pixel_format, self.output.pixel_format) {
            return Err(TranscodeError::InvalidFrame {
                reason: format!(
                    "no conversion from {:?} to {:?}",
                    source.pixel_format, self.output.pixel_format
                ),
            });
        }

        let data = if source == self.output {
            frame.data.clone()
        } else {
            let scaled = scale(&frame.data, source, self.output.width, self.output.height);
            convert(scaled, source.pixel_format, self.output).into()
        };

        let mut out = Frame::video(self.output_id, self.output, data)
            .with_duration(self.input_timebase.rescale(frame.duration, self.output_timebase));
        out.pts = frame
            .pts
            .map(|pts| self.input_timebase.rescale(pts, self.output_timebase));
        Ok(vec![out])
    }
}

impl FrameProcessor for Rescaler {
    fn process(&mut self, frame: Frame) -> TranscodeResult<Vec<Frame>> {
        Rescaler::process(self, frame)
    }

    fn flush(&mut self) -> Vec<Frame> {
        Vec::new()
    }
}

/// Nearest-neighbour scaling of one tightly packed plane
fn scale_plane(
    src: &[u8],
    (src_w, src_h): (usize, usize),
    bpp: usize,
    (dst_w, dst_h): (usize, usize),
    out: &mut Vec<u8>,
) {
    for y in 0..dst_h {
        let sy = y * src_h / dst_h;
        let row = &src[sy * src_w * bpp..(sy + 1) * src_w * bpp];
        for x in 0..dst_w {
            let sx = x * src_w / dst_w;
            out.extend_from_slice(&row[sx * bpp..(sx + 1) * bpp]);
        }
    }
}

/// Scale a picture to `width`x`height`, keeping its pixel format
fn scale(data: &[u8], source: VideoGeometry, width: u32, height: u32) -> Vec<u8> {
    let format = source.pixel_format;
    let (sw, sh) = (source.width as usize, source.height as usize);
    let (dw, dh) = (width as usize, height as usize);
    let mut out = Vec::with_capacity(format.buffer_size(width, height));

    match format.packed_bytes_per_pixel() {
        Some(bpp) => scale_plane(data, (sw, sh), bpp, (dw, dh), &mut out),
        None => {
            let luma = sw * sh;
            let (scw, sch) = (sw.div_ceil(2), sh.div_ceil(2));
            let (dcw, dch) = (dw.div_ceil(2), dh.div_ceil(2));
            scale_plane(&data[..luma], (sw, sh), 1, (dw, dh), &mut out);

            if format == PixelFormat::Nv12 {
                scale_plane(&data[luma..luma + scw * sch * 2], (scw, sch), 2, (dcw, dch), &mut out);
            } else {
                let chroma = scw * sch;
                let (u, v) = data[luma..luma + chroma * 2].split_at(chroma);
                scale_plane(u, (scw, sch), 1, (dcw, dch), &mut out);
                scale_plane(v, (scw, sch), 1, (dcw, dch), &mut out);
            }
        }
    }
    out
}

/// Convert a picture already at the output size into the output format
fn convert(mut data: Vec<u8>, from: PixelFormat, output: VideoGeometry) -> Vec<u8> {
    match (from, output.pixel_format) {
        (PixelFormat::Rgba, PixelFormat::Bgra) | (PixelFormat::Bgra, PixelFormat::Rgba) => {
            data.chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
            data
        }
        (PixelFormat::Yuv420p, to @ (PixelFormat::Rgba | PixelFormat::Bgra)) => {
            yuv420p_to_packed(&data, output.width as usize, output.height as usize, to == PixelFormat::Bgra)
        }
        _ => data,
    }
}

/// BT.601 limited range YUV 4:2:0 to 8-bit RGBA or BGRA
fn yuv420p_to_packed(data: &[u8], width: usize, height: usize, bgra: bool) -> Vec<u8> {
    let luma = width * height;
    let cw = width.div_ceil(2);
    let chroma = cw * height.div_ceil(2);
    let (y_plane, rest) = data.split_at(luma);
    let (u_plane, v_plane) = rest.split_at(chroma);

    let mut out = Vec::with_capacity(luma * 4);
    for row in 0..height {
        for col in 0..width {
            let c = y_plane[row * width + col] as i32 - 16;
            let ci = (row / 2) * cw + col / 2;
            let d = u_plane[ci] as i32 - 128;
            let e = v_plane[ci] as i32 - 128;

            let r = ((298 * c + 409 * e + 128) >> 8).clamp(0, 255) as u8;
            let g = ((298 * c - 100 * d - 208 * e + 128) >> 8).clamp(0, 255) as u8;
            let b = ((298 * c + 516 * d + 128) >> 8).clamp(0, 255) as u8;

            if bgra {
                out.extend_from_slice(&[b, g, r, 255]);
            } else {
                out.extend_from_slice(&[r, g, b, 255]);
            }
        }
    }
    out
}
