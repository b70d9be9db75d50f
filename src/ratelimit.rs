//! Client-side per-minute record cap.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Counts accepted records per calendar minute and refuses the overflow.
///
/// The minute key is the epoch minute (`unix_seconds / 60`), which is
/// monotonic and cannot collide across days or months. Counts for past
/// minutes linger until [`purge_stale`](Self::purge_stale) runs; the
/// delivery worker calls it on every tick.
#[derive(Debug, Default)]
pub(crate) struct MinuteRateLimiter {
    counts: HashMap<u64, u32>,
    current_minute: u64,
}

impl MinuteRateLimiter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Counts one record against the current minute.
    ///
    /// Returns whether the record may pass. A `limit` of zero means
    /// unlimited; the count is still tracked so a later reconfiguration
    /// starts from an honest value.
    pub(crate) fn try_acquire(&mut self, limit: u32) -> bool {
        self.try_acquire_at(limit, Self::epoch_minute(SystemTime::now()))
    }

    fn try_acquire_at(&mut self, limit: u32, minute: u64) -> bool {
        if minute != self.current_minute {
            self.current_minute = minute;
        }
        let count = self.counts.entry(minute).or_insert(0);
        *count += 1;
        limit == 0 || *count <= limit
    }

    /// Drops counters for minutes that can no longer be incremented.
    pub(crate) fn purge_stale(&mut self) {
        let current = self.current_minute;
        self.counts.retain(|minute, _| *minute >= current);
    }

    /// Forgets all counts; used when the cap is reconfigured.
    pub(crate) fn reset(&mut self) {
        self.counts.clear();
    }

    fn epoch_minute(now: SystemTime) -> u64 {
        now.duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            / 60
    }
}
