//! Compressed access units handed from ingest to the decode stage

use bytes::Bytes;

/// One compressed access unit as received from upstream
///
/// Timestamps are expressed in the owning track's timebase and are not
/// guaranteed to be monotonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Owning track id
    pub track_id: u32,
    /// Opaque compressed payload
    pub data: Bytes,
    /// Presentation timestamp
    pub pts: Option<i64>,
    /// Decode timestamp
    pub dts: Option<i64>,
    /// Whether the packet starts a random access point
    pub key_frame: bool,
}

impl Packet {
    /// Create a packet without timestamps
    pub fn new(track_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            track_id,
            data: data.into(),
            pts: None,
            dts: None,
            key_frame: false,
        }
    }

    /// Set presentation and decode timestamp to the same value
    pub fn with_timestamp(mut self, ts: i64) -> Self {
        self.pts = Some(ts);
        self.dts = Some(ts);
        self
    }

    /// Set presentation timestamp
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set decode timestamp
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Mark as key frame
    pub fn with_key_frame(mut self, key_frame: bool) -> Self {
        self.key_frame = key_frame;
        self
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
