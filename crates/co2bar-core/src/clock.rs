//! Wall-clock abstraction used to timestamp samples
//!
//! Before any network time arrives the device counts seconds since boot. The
//! first time a network time becomes available the sensor manager copies it
//! into the backup clock once; from then on timestamps are real epoch seconds.

pub trait Clock {
    /// Current time in epoch seconds (or seconds since boot before sync).
    fn now_epoch_secs(&self) -> u64;

    /// A network time in epoch seconds, if one has arrived since the last call.
    fn network_time(&mut self) -> Option<u64>;

    /// Set the hardware backup clock.
    fn set_backup_clock(&mut self, epoch_secs: u64);
}

/// Clock counting from an offset applied to a monotonic seconds source.
///
/// `uptime_secs` is supplied by the caller so the same logic runs on top of
/// `embassy_time::Instant` on the device and on a fake source in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetClock {
    offset_secs: u64,
}

impl OffsetClock {
    pub const fn new() -> Self {
        Self { offset_secs: 0 }
    }

    pub fn now(&self, uptime_secs: u64) -> u64 {
        self.offset_secs.saturating_add(uptime_secs)
    }

    /// Anchor the clock so that `now(uptime_secs)` returns `epoch_secs`.
    pub fn set(&mut self, epoch_secs: u64, uptime_secs: u64) {
        self.offset_secs = epoch_secs.saturating_sub(uptime_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_clock_counts_uptime_before_sync() {
        let clock = OffsetClock::new();
        assert_eq!(clock.now(42), 42);
    }

    #[test]
    fn test_offset_clock_anchors_to_epoch() {
        let mut clock = OffsetClock::new();
        clock.set(1_700_000_000, 100);
        assert_eq!(clock.now(100), 1_700_000_000);
        assert_eq!(clock.now(160), 1_700_000_060);
    }
}
