//! This module implements an [`Instant`] with millisecond precision.

use core::fmt;
use core::ops::{Add, Sub};

use super::Duration;

/// An instant on the monotonic tick, counted in milliseconds since the platform started.
///
/// Instants are only meaningful relative to one another within one power cycle.
#[derive(
    Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Instant {
    millis: u64,
}

impl Instant {
    /// The tick at power-on.
    pub const ZERO: Instant = Instant { millis: 0 };

    /// The largest value that can be represented by the [`Instant`] type.
    pub const MAX: Instant = Instant { millis: u64::MAX };

    /// Creates an instant `millis` milliseconds after power-on.
    pub const fn from_millis(millis: u64) -> Instant {
        Instant { millis }
    }

    /// Returns the number of milliseconds since power-on.
    pub const fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Returns the [`Duration`] between this [`Instant`] and the given one if, and only if,
    /// the given one is earlier than this, otherwise returns None.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_osal_api::time::{Duration, Instant};
    ///
    /// let begin = Instant::from_millis(100);
    /// let end = Instant::from_millis(350);
    ///
    /// assert_eq!(end.duration_since(begin), Some(Duration::from_millis(250)));
    /// assert_eq!(begin.duration_since(end), None);
    /// ```
    pub const fn duration_since(&self, earlier: Instant) -> Option<Duration> {
        if self.millis < earlier.millis {
            return None;
        }

        Some(Duration::from_millis(self.millis - earlier.millis))
    }

    /// Like [`Instant::duration_since`] but returns [`Duration::ZERO`] when `earlier` is later than `self`.
    pub const fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_millis(self.millis.saturating_sub(earlier.millis))
    }

    /// Adds one [`Duration`] to self, returning a new [`Instant`] or None in the event of an overflow.
    pub const fn checked_add(self, rhs: Duration) -> Option<Instant> {
        match self.millis.checked_add(rhs.as_millis()) {
            Some(millis) => Some(Instant { millis }),
            None => None,
        }
    }

    /// Adds one [`Duration`] to self, clamping at [`Instant::MAX`].
    pub const fn saturating_add(self, rhs: Duration) -> Instant {
        Instant {
            millis: self.millis.saturating_add(rhs.as_millis()),
        }
    }

    /// Subtracts one [`Duration`] from self, returning None in the event of an underflow.
    pub const fn checked_sub(self, rhs: Duration) -> Option<Instant> {
        match self.millis.checked_sub(rhs.as_millis()) {
            Some(millis) => Some(Instant { millis }),
            None => None,
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    /// Saturates at [`Instant::MAX`].
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<Duration> for Instant {
    type Output = Self;

    /// # Panics
    ///
    /// This function panics if the resulting instant underflows. See [`Instant::checked_sub`] for a
    /// version without panic.
    fn sub(self, rhs: Duration) -> Self::Output {
        let Some(result) = self.checked_sub(rhs) else {
            panic!("underflow when subtracting a duration from an instant");
        };

        result
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    /// Returns the elapsed time, or [`Duration::ZERO`] if `rhs` is later.
    fn sub(self, rhs: Instant) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T+{}ms", self.millis)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{Duration, Instant};

    #[test]
    fn addition_saturates() {
        assert_eq!(Instant::MAX + Duration::from_millis(1), Instant::MAX);
        assert_eq!(Instant::MAX.checked_add(Duration::from_millis(1)), None);
    }

    #[test]
    fn subtracting_instants_never_goes_negative() {
        let early = Instant::from_millis(10);
        let late = Instant::from_millis(40);
        assert_eq!(late - early, Duration::from_millis(30));
        assert_eq!(early - late, Duration::ZERO);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn subtracting_past_zero_panics() {
        let _ = Instant::ZERO - Duration::from_millis(1);
    }

    #[test]
    fn debug_shows_tick() {
        use std::format;
        assert_eq!(format!("{:?}", Instant::from_millis(42)), "T+42ms");
    }
}
