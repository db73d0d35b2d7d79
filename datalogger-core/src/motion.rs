//! Motion-based wake/sleep gating.
//!
//! The device sleeps until it is moved: a sample whose acceleration differs from the resting baseline by more than
//! the wake-up threshold wakes it, and a quiet period without such a sample puts it back to sleep. The baseline is
//! the first sample seen after start-up, when the vehicle is assumed to be at rest, unless one is set explicitly.

use core::fmt;

use datalogger_osal_api::time::{Duration, Instant};

use crate::config::Config;

/// Power state decided by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// Acquisition stopped; only motion samples are taken.
    Sleep,
    /// Acquisition running inside a Session.
    Awake,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionState::Sleep => f.write_str("sleep"),
            MotionState::Awake => f.write_str("awake"),
        }
    }
}

/// A state change reported by [`MotionGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Sleep` to `Awake`: a new Session starts.
    Woke,
    /// `Awake` to `Sleep`: the current Session ends.
    Slept,
}

/// Decides between sleep and acquisition from motion samples.
#[derive(Debug, Clone)]
pub struct MotionGate {
    state: MotionState,
    threshold: f32,
    quiet_period: Duration,
    baseline: Option<[f32; 3]>,
    last_motion: Instant,
}

impl MotionGate {
    /// Creates a sleeping gate.
    pub fn new(threshold: f32, quiet_period: Duration) -> Self {
        Self {
            state: MotionState::Sleep,
            threshold,
            quiet_period,
            baseline: None,
            last_motion: Instant::ZERO,
        }
    }

    /// Creates a sleeping gate with the configured threshold and quiet period.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.wakeup_motion_threshold, config.motion_quiet_period)
    }

    /// Uses `baseline` as the resting acceleration instead of calibrating from the first sample.
    pub fn with_baseline(mut self, baseline: [f32; 3]) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Current state.
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// The resting acceleration, once known.
    pub fn baseline(&self) -> Option<[f32; 3]> {
        self.baseline
    }

    /// Feeds one acceleration sample.
    ///
    /// The first sample of an uncalibrated gate becomes the baseline and never causes a transition.
    pub fn observe(&mut self, now: Instant, accel: [f32; 3]) -> Option<Transition> {
        let Some(baseline) = self.baseline else {
            tracing::debug!(?accel, "motion baseline calibrated");
            self.baseline = Some(accel);
            return self.check_quiet(now);
        };

        let magnitude = accel
            .iter()
            .zip(baseline)
            .map(|(axis, rest)| (axis - rest) * (axis - rest))
            .sum::<f32>()
            .sqrt();
        self.observe_magnitude(now, magnitude)
    }

    /// Feeds one motion magnitude, in g relative to rest.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_core::motion::{MotionGate, MotionState, Transition};
    /// use datalogger_osal_api::time::{Duration, Instant};
    ///
    /// let mut gate = MotionGate::new(0.3, Duration::from_secs(60));
    /// assert_eq!(gate.observe_magnitude(Instant::from_millis(100), 0.2), None);
    /// assert_eq!(gate.observe_magnitude(Instant::from_millis(200), 0.35), Some(Transition::Woke));
    /// assert_eq!(gate.state(), MotionState::Awake);
    /// ```
    pub fn observe_magnitude(&mut self, now: Instant, magnitude: f32) -> Option<Transition> {
        if magnitude > self.threshold {
            self.last_motion = now;
            if self.state == MotionState::Sleep {
                self.state = MotionState::Awake;
                tracing::info!(magnitude, threshold = self.threshold, "motion detected, waking up");
                return Some(Transition::Woke);
            }
            return None;
        }
        self.check_quiet(now)
    }

    /// Puts the gate to sleep once the quiet period has passed without qualifying motion.
    ///
    /// Call this on every loop iteration, so a sensor that stops delivering samples also ends the Session.
    pub fn check_quiet(&mut self, now: Instant) -> Option<Transition> {
        if self.state != MotionState::Awake {
            return None;
        }
        let quiet_for = now.saturating_duration_since(self.last_motion);
        if quiet_for < self.quiet_period {
            return None;
        }
        self.state = MotionState::Sleep;
        tracing::info!(quiet_for = %quiet_for, "no motion, going to sleep");
        Some(Transition::Slept)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn gate() -> MotionGate {
        MotionGate::new(0.3, Duration::from_secs(60))
    }

    fn at(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    #[test_case(0.35, Some(Transition::Woke) ; "above threshold")]
    #[test_case(0.30, None ; "at threshold")]
    #[test_case(0.05, None ; "below threshold")]
    fn wakes_only_above_threshold(magnitude: f32, expected: Option<Transition>) {
        let mut gate = gate();
        assert_eq!(gate.observe_magnitude(at(0), magnitude), expected);
    }

    #[test]
    fn quiet_period_puts_gate_to_sleep() {
        let mut gate = gate();
        gate.observe_magnitude(at(1_000), 0.5);

        assert_eq!(gate.observe_magnitude(at(30_000), 0.1), None);
        assert_eq!(gate.observe_magnitude(at(40_000), 0.4), None);
        assert_eq!(gate.check_quiet(at(99_999)), None);
        assert_eq!(gate.check_quiet(at(100_000)), Some(Transition::Slept));
        assert_eq!(gate.state(), MotionState::Sleep);
        assert_eq!(gate.check_quiet(at(200_000)), None);
    }

    #[test]
    fn first_sample_calibrates_baseline() {
        let mut gate = gate();
        assert_eq!(gate.observe(at(0), [0.02, -0.01, 0.98]), None);
        assert_eq!(gate.baseline(), Some([0.02, -0.01, 0.98]));

        // Gravity alone is not motion.
        assert_eq!(gate.observe(at(100), [0.02, -0.01, 1.0]), None);
        // A 0.4 g jolt along x is.
        assert_eq!(
            gate.observe(at(200), [0.42, -0.01, 0.98]),
            Some(Transition::Woke)
        );
    }

    #[test]
    fn explicit_baseline_skips_calibration() {
        let mut gate = gate().with_baseline([0.0, 0.0, 1.0]);
        assert_eq!(
            gate.observe(at(0), [0.0, 0.0, 1.5]),
            Some(Transition::Woke)
        );
    }
}
