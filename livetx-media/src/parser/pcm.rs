//! Fixed-size framing for raw PCM

use super::{Stamp, StampTracker};
use crate::codecs::{AccessUnit, BitstreamParser, ParseError, Parsed};
use bytes::BytesMut;
use livetx_core::SampleFormat;

/// Cuts interleaved PCM into units of a fixed number of samples
#[derive(Debug)]
pub struct PcmParser {
    unit_bytes: usize,
    carry: BytesMut,
    carry_stamp: Option<Stamp>,
    stamps: StampTracker,
}

impl PcmParser {
    /// Create a parser emitting `samples_per_unit` samples per channel
    pub fn new(samples_per_unit: usize, channels: u16, sample_format: SampleFormat) -> Self {
        let unit_bytes =
            (samples_per_unit * channels as usize * sample_format.bytes_per_sample()).max(1);
        Self {
            unit_bytes,
            carry: BytesMut::with_capacity(unit_bytes),
            carry_stamp: None,
            stamps: StampTracker::new(),
        }
    }

    /// Size of one unit in bytes
    pub fn unit_bytes(&self) -> usize {
        self.unit_bytes
    }

    /// Bytes held back waiting for the rest of a unit
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }
}

impl BitstreamParser for PcmParser {
    fn parse(&mut self, data: &[u8], pts: Option<i64>, dts: Option<i64>) -> Result<Parsed, ParseError> {
        self.stamps.begin_packet(pts, dts);

        let mut units = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            if self.carry.is_empty() {
                self.carry_stamp = Some(self.stamps.take());
            }

            let wanted = self.unit_bytes - self.carry.len();
            let take = wanted.min(data.len() - offset);
            self.carry.extend_from_slice(&data[offset..offset + take]);
            offset += take;

            if self.carry.len() == self.unit_bytes {
                let (pts, dts) = self.carry_stamp.take().unwrap_or_default();
                units.push(AccessUnit {
                    data: self.carry.split().freeze(),
                    pts,
                    dts,
                    duration: self.stamps.duration_for(pts),
                    key_frame: true,
                });
            }
        }

        Ok(Parsed {
            consumed: data.len(),
            units,
        })
    }

    fn name(&self) -> &str {
        "pcm"
    }
}
