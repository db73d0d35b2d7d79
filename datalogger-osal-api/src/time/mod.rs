//! Abstractions for time-based operations.
//!
//! The acquisition core never reads a platform clock directly. It asks a [`TimeAbstraction`] for the current
//! [`Instant`], which keeps every component deterministic under test and lets the same code run against a hardware
//! tick counter or the host's monotonic clock.
//!
//! # Example
//!
//! ```rust
//! use datalogger_osal_api::time::{Duration, Instant, TimeAbstraction};
//!
//! #[derive(Debug)]
//! struct Fixed(Instant);
//!
//! impl TimeAbstraction for Fixed {
//!     fn now(&self) -> Instant {
//!         self.0
//!     }
//! }
//!
//! let time = Fixed(Instant::from_millis(1_500));
//! let deadline = time.now() + Duration::from_millis(500);
//!
//! assert_eq!(deadline.as_millis(), 2_000);
//! ```

mod duration;
mod instant;

pub use self::duration::Duration;
pub use self::instant::Instant;

/// `TimeAbstraction` is used to read the monotonic tick in a platform-agnostic manner.
pub trait TimeAbstraction {
    /// Retrieves the current time.
    ///
    /// Consecutive calls never go backwards.
    fn now(&self) -> Instant;

    /// Returns the time elapsed since `earlier`, or [`Duration::ZERO`] if `earlier` is in the future.
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

impl<T> TimeAbstraction for &T
where
    T: TimeAbstraction + ?Sized,
{
    fn now(&self) -> Instant {
        (**self).now()
    }
}
