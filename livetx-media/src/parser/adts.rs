//! ADTS framing for AAC
//!
//! Emits whole ADTS frames (header included) as access units. Junk between
//! frames is skipped by resynchronising on the 12-bit syncword.

use super::{Stamp, StampTracker};
use crate::codecs::{AccessUnit, BitstreamParser, ParseError, Parsed};
use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

/// ADTS fixed plus variable header size without CRC
pub const ADTS_HEADER_LEN: usize = 7;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Decoded ADTS header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// Header size, 9 when a CRC follows
    pub header_len: usize,
    /// AAC object type minus one
    pub profile: u8,
    /// Sampling frequency index
    pub sample_rate_index: u8,
    /// Channel configuration
    pub channel_config: u8,
    /// Frame length including the header
    pub frame_length: usize,
    /// Raw data blocks in the frame
    pub raw_blocks: u8,
}

impl AdtsHeader {
    /// Parse a header from at least [`ADTS_HEADER_LEN`] bytes
    pub fn parse(b: &[u8]) -> Result<Self, ParseError> {
        if b.len() < ADTS_HEADER_LEN {
            return Err(ParseError::Corrupt {
                reason: format!("ADTS header needs {} bytes, got {}", ADTS_HEADER_LEN, b.len()),
            });
        }
        if !is_sync(b[0], b[1]) {
            return Err(ParseError::Corrupt {
                reason: "missing ADTS syncword".to_string(),
            });
        }

        let header_len = if b[1] & 0x01 == 1 { 7 } else { 9 };
        let profile = b[2] >> 6;
        let sample_rate_index = (b[2] >> 2) & 0x0F;
        if sample_rate_index as usize >= SAMPLE_RATES.len() {
            return Err(ParseError::Corrupt {
                reason: format!("invalid sampling frequency index {}", sample_rate_index),
            });
        }
        let channel_config = ((b[2] & 0x01) << 2) | (b[3] >> 6);
        let frame_length =
            ((b[3] as usize & 0x03) << 11) | ((b[4] as usize) << 3) | (b[5] as usize >> 5);
        if frame_length < header_len {
            return Err(ParseError::Corrupt {
                reason: format!("ADTS frame length {} shorter than header", frame_length),
            });
        }

        Ok(Self {
            header_len,
            profile,
            sample_rate_index,
            channel_config,
            frame_length,
            raw_blocks: (b[6] & 0x03) + 1,
        })
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[self.sample_rate_index as usize]
    }

    /// Samples per channel carried by the frame
    pub fn samples(&self) -> usize {
        1024 * self.raw_blocks as usize
    }
}

fn is_sync(b0: u8, b1: u8) -> bool {
    b0 == 0xFF && (b1 & 0xF6) == 0xF0
}

/// ADTS bitstream parser
#[derive(Debug, Default)]
pub struct AdtsParser {
    carry: BytesMut,
    carry_stamp: Option<Stamp>,
    stamps: StampTracker,
    skipped: u64,
}

impl AdtsParser {
    /// Create a parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Total junk bytes skipped while resynchronising
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Drop bytes before the next syncword; `false` if none is buffered
    fn resync(&mut self) -> bool {
        let found = self
            .carry
            .windows(2)
            .position(|w| is_sync(w[0], w[1]));

        match found {
            Some(0) => true,
            Some(pos) => {
                self.skip(pos);
                true
            }
            None => {
                // Keep a trailing 0xFF, it may start a syncword
                let keep = usize::from(self.carry.last() == Some(&0xFF));
                let drop = self.carry.len() - keep;
                self.skip(drop);
                false
            }
        }
    }

    fn skip(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        debug!(count, "Skipping bytes before ADTS syncword");
        self.carry.advance(count);
        self.skipped += count as u64;
    }
}

impl BitstreamParser for AdtsParser {
    fn parse(&mut self, data: &[u8], pts: Option<i64>, dts: Option<i64>) -> Result<Parsed, ParseError> {
        self.stamps.begin_packet(pts, dts);
        if data.is_empty() {
            return Ok(Parsed::default());
        }

        if self.carry.is_empty() {
            self.carry_stamp = Some(self.stamps.take());
        }
        self.carry.extend_from_slice(data);

        let mut units = Vec::new();
        while self.resync() && self.carry.len() >= ADTS_HEADER_LEN {
            let header = match AdtsHeader::parse(&self.carry[..ADTS_HEADER_LEN]) {
                Ok(header) => header,
                Err(e) => {
                    self.carry.clear();
                    self.carry_stamp = None;
                    if units.is_empty() {
                        return Err(e);
                    }
                    warn!(units = units.len(), "Dropping ADTS data after corrupt header: {}", e);
                    break;
                }
            };
            if self.carry.len() < header.frame_length {
                break;
            }

            let (pts, dts) = self.carry_stamp.take().unwrap_or_default();
            units.push(AccessUnit {
                data: self.carry.split_to(header.frame_length).freeze(),
                pts,
                dts,
                duration: self.stamps.duration_for(pts),
                key_frame: true,
            });

            if !self.carry.is_empty() {
                self.carry_stamp = Some(self.stamps.take());
            }
        }

        Ok(Parsed {
            consumed: data.len(),
            units,
        })
    }

    fn name(&self) -> &str {
        "adts"
    }
}
