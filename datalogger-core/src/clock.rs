//! Monotonic tick plus wall-clock estimate.
//!
//! The device has no real-time clock. Every timestamp carries the monotonic tick; once a GNSS fix has reported UTC
//! time, the [`Clock`] also knows the offset from tick to Unix time and stamps readings with an estimated wall-clock
//! value.

use datalogger_osal_api::time::Instant;
use serde::{Deserialize, Serialize};

/// When a reading was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Monotonic tick.
    pub tick: Instant,
    /// Estimated wall-clock time in milliseconds since the Unix epoch, once known.
    pub wall_millis: Option<u64>,
}

impl Timestamp {
    /// A timestamp without wall-clock information.
    pub const fn monotonic(tick: Instant) -> Self {
        Self {
            tick,
            wall_millis: None,
        }
    }
}

/// Converts monotonic ticks to timestamps.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    /// Unix milliseconds minus tick milliseconds.
    offset: Option<i128>,
}

impl Clock {
    /// Creates a clock with no wall-clock estimate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once a wall-clock reference has been seen.
    pub fn is_synced(&self) -> bool {
        self.offset.is_some()
    }

    /// Records that the wall-clock time at `tick` was `utc_millis`.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_core::clock::Clock;
    /// use datalogger_osal_api::time::Instant;
    ///
    /// let mut clock = Clock::new();
    /// clock.sync(Instant::from_millis(1_000), 1_700_000_000_000);
    ///
    /// let later = clock.timestamp(Instant::from_millis(1_500));
    /// assert_eq!(later.wall_millis, Some(1_700_000_000_500));
    /// ```
    pub fn sync(&mut self, tick: Instant, utc_millis: u64) {
        let offset = i128::from(utc_millis) - i128::from(tick.as_millis());
        match self.offset {
            None => tracing::info!(utc_millis, "wall clock synchronized"),
            Some(previous) if previous != offset => {
                tracing::trace!(drift_ms = %(offset - previous), "wall clock adjusted");
            }
            Some(_) => {}
        }
        self.offset = Some(offset);
    }

    /// Estimated wall-clock time at `tick`.
    pub fn wall_at(&self, tick: Instant) -> Option<u64> {
        let offset = self.offset?;
        u64::try_from(i128::from(tick.as_millis()) + offset).ok()
    }

    /// Stamps `tick` with the current wall-clock estimate.
    pub fn timestamp(&self, tick: Instant) -> Timestamp {
        Timestamp {
            tick,
            wall_millis: self.wall_at(tick),
        }
    }
}
