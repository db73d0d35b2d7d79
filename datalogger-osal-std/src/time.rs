//! Process-monotonic time.

use std::sync::LazyLock;

pub use datalogger_osal_api::time::{Duration, Instant, TimeAbstraction};

static EPOCH: LazyLock<std::time::Instant> = LazyLock::new(std::time::Instant::now);

/// Implements the [`TimeAbstraction`] trait for standard Rust.
///
/// Instants count milliseconds since the first use of any `Time` in the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Time;

impl Time {
    /// Blocks the current thread until `deadline`.
    pub fn sleep_until(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(self.now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining.into());
        }
    }

    /// Milliseconds since the Unix epoch according to the host's wall clock, if it is set.
    pub fn unix_millis(&self) -> Option<u64> {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .ok()?;
        u64::try_from(since_epoch.as_millis()).ok()
    }
}

impl TimeAbstraction for Time {
    fn now(&self) -> Instant {
        Instant::ZERO + Duration::from(EPOCH.elapsed())
    }
}

#[cfg(all(test, not(miri)))]
mod tests {
    use super::*;

    #[test]
    fn time_is_monotonic() {
        let time = Time;
        let a = time.now();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let b = time.now();
        assert!(b.saturating_duration_since(a) >= Duration::from_millis(20));
    }

    #[test]
    fn sleep_until_waits_for_the_deadline() {
        let time = Time;
        let deadline = time.now() + Duration::from_millis(30);
        time.sleep_until(deadline);
        assert!(time.now() >= deadline);

        // A deadline in the past returns right away.
        time.sleep_until(Instant::ZERO);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(Time.unix_millis().is_some_and(|millis| millis > 1_577_836_800_000));
    }
}
