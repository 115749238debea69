//! Bitstream parsers and their shared timestamp bookkeeping
//!
//! A parser may cut one packet into several access units, or glue several
//! packets into one. Units are stamped with the timestamps of the packet in
//! which they begin, once per packet; units that begin later in the same
//! packet carry no timestamp and are recovered downstream.

#[cfg(feature = "adts")]
pub mod adts;
#[cfg(feature = "pcm")]
pub mod pcm;

/// Presentation and decode timestamp pair
pub type Stamp = (Option<i64>, Option<i64>);

/// Tracks packet timestamps on behalf of a parser
#[derive(Debug, Default, Clone)]
pub struct StampTracker {
    pts: Option<i64>,
    dts: Option<i64>,
    fresh: bool,
    last_pts: Option<i64>,
}

impl StampTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the timestamps of the packet being fed
    ///
    /// A call without any timestamp keeps the current packet's state.
    pub fn begin_packet(&mut self, pts: Option<i64>, dts: Option<i64>) {
        if pts.is_some() || dts.is_some() {
            self.pts = pts;
            self.dts = dts;
            self.fresh = true;
        }
    }

    /// Timestamps for a unit that begins now
    pub fn take(&mut self) -> Stamp {
        if self.fresh {
            self.fresh = false;
            (self.pts, self.dts)
        } else {
            (None, None)
        }
    }

    /// Distance from the previous stamped unit, 0 when unknown
    pub fn duration_for(&mut self, pts: Option<i64>) -> i64 {
        let Some(current) = pts else {
            return 0;
        };
        let duration = self.last_pts.map_or(0, |last| (current - last).max(0));
        self.last_pts = Some(current);
        duration
    }

    /// Forget all state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_taken_once_per_packet() {
        let mut tracker = StampTracker::new();
        tracker.begin_packet(Some(100), Some(90));
        assert_eq!(tracker.take(), (Some(100), Some(90)));
        assert_eq!(tracker.take(), (None, None));

        // Continuation of the same packet
        tracker.begin_packet(None, None);
        assert_eq!(tracker.take(), (None, None));

        tracker.begin_packet(Some(200), None);
        assert_eq!(tracker.take(), (Some(200), None));
    }

    #[test]
    fn test_duration_between_stamped_units() {
        let mut tracker = StampTracker::new();
        assert_eq!(tracker.duration_for(Some(0)), 0);
        assert_eq!(tracker.duration_for(None), 0);
        assert_eq!(tracker.duration_for(Some(1024)), 1024);
        assert_eq!(tracker.duration_for(Some(512)), 0);

        tracker.reset();
        assert_eq!(tracker.duration_for(Some(2048)), 0);
    }
}
