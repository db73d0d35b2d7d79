//! This module implements a [`Duration`] with millisecond precision.

use core::fmt;
use core::ops::{Add, Div, Mul};

/// Duration represents a span of time.
///
/// Negative durations are not supported. The firmware configuration expresses every interval in milliseconds, so
/// that is the resolution used here.
#[derive(
    Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Duration {
    millis: u64,
}

impl Duration {
    /// The largest value that can be represented by the `Duration` type.
    pub const MAX: Duration = Duration { millis: u64::MAX };

    /// A duration of zero time.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_osal_api::time::Duration;
    ///
    /// assert_eq!(Duration::ZERO, Duration::from_millis(0));
    /// ```
    pub const ZERO: Duration = Duration { millis: 0 };

    const MILLIS_PER_SECOND: u64 = 1_000;

    /// Creates a duration from the specified number of seconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_osal_api::time::Duration;
    ///
    /// assert_eq!(Duration::from_secs(3), Duration::from_millis(3000));
    /// ```
    pub const fn from_secs(secs: u64) -> Duration {
        Duration {
            millis: secs.saturating_mul(Self::MILLIS_PER_SECOND),
        }
    }

    /// Creates a duration from the specified number of milliseconds.
    pub const fn from_millis(millis: u64) -> Duration {
        Duration { millis }
    }

    /// Returns the total amount of seconds, rounded down.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_osal_api::time::Duration;
    ///
    /// assert_eq!(Duration::from_millis(1980).as_secs(), 1);
    /// ```
    pub const fn as_secs(&self) -> u64 {
        self.millis / Self::MILLIS_PER_SECOND
    }

    /// Returns the total amount of milliseconds.
    pub const fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Returns `true` if this duration spans no time.
    pub const fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Adds two durations, returning `None` on overflow.
    pub const fn checked_add(self, rhs: Duration) -> Option<Duration> {
        match self.millis.checked_add(rhs.millis) {
            Some(millis) => Some(Duration { millis }),
            None => None,
        }
    }

    /// Subtracts `rhs`, clamping at [`Duration::ZERO`].
    pub const fn saturating_sub(self, rhs: Duration) -> Duration {
        Duration {
            millis: self.millis.saturating_sub(rhs.millis),
        }
    }

    /// Multiplies by `rhs`, clamping at [`Duration::MAX`].
    pub const fn saturating_mul(self, rhs: u32) -> Duration {
        Duration {
            millis: self.millis.saturating_mul(rhs as u64),
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    /// # Panics
    ///
    /// Panics on overflow. See [`Duration::checked_add`] for a version without panic.
    fn add(self, rhs: Duration) -> Self::Output {
        let Some(result) = self.checked_add(rhs) else {
            panic!("overflow when adding durations");
        };

        result
    }
}

impl Mul<u32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: u32) -> Self::Output {
        self.saturating_mul(rhs)
    }
}

impl Div<u32> for Duration {
    type Output = Duration;

    /// # Panics
    ///
    /// Panics if `rhs` is zero.
    fn div(self, rhs: u32) -> Self::Output {
        Duration {
            millis: self.millis / u64::from(rhs),
        }
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Duration> for core::time::Duration {
    fn from(value: Duration) -> Self {
        core::time::Duration::from_millis(value.millis)
    }
}

impl From<core::time::Duration> for Duration {
    /// Truncates to whole milliseconds, saturating for durations beyond `u64::MAX` milliseconds.
    fn from(value: core::time::Duration) -> Self {
        Duration {
            millis: u64::try_from(value.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
