//! The acquisition scheduler.
//!
//! Each enabled source lives in a slot with its own state machine:
//!
//! ```text
//!                     init ok                 failures >= limit
//!  Uninitialized ──► Probing ─────────► Active ◄────────────────► Degraded
//!                       │                        successful poll      ▲
//!                       └──────────── init failed ────────────────────┘ (permanent)
//! ```
//!
//! [`Scheduler::tick`] polls every slot whose due time has passed, in the fixed [`SourceKind::ALL`] order, at most
//! once per tick. A poll is bounded by the configured poll timeout, so one slow source delays the others by at most
//! that much.
//!
//! Slots hold sources as trait objects. [`Scheduler::install`] admits at most one per enabled [`SourceKind`], so the
//! set stays closed while sources can still wrap any driver.

use core::fmt;

use datalogger_osal_api::time::{Duration, Instant};

use crate::buffer::RecordBuffer;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::LoggerError;
use crate::reading::{MemsData, Payload, Reading, SourceKind};
use crate::session::Session;
use crate::source::{PollError, SensorCapability};

/// Lifecycle state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Installed, initialization not run yet.
    Uninitialized,
    /// Initialization in progress.
    Probing,
    /// Polled at its regular interval.
    Active,
    /// Polled at a reduced rate after repeated failures or a failed initialization.
    Degraded,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Uninitialized => "uninitialized",
            SourceState::Probing => "probing",
            SourceState::Active => "active",
            SourceState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Poll counters of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Polls issued.
    pub polls: u64,
    /// Polls that produced a reading.
    pub readings: u64,
    /// Polls that failed with [`PollError::Unavailable`].
    pub unavailable: u64,
    /// Polls that failed with [`PollError::Timeout`].
    pub timeouts: u64,
    /// Polls that failed with [`PollError::ProtocolError`].
    pub protocol_errors: u64,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    poll_interval: Duration,
    retry_interval: Duration,
    degraded_interval: Duration,
}

#[derive(Debug)]
struct Slot {
    kind: SourceKind,
    source: Box<dyn SensorCapability>,
    state: SourceState,
    /// Set when initialization failed; such a source is never polled.
    dead: bool,
    timing: Timing,
    next_due: Instant,
    consecutive_failures: u32,
    stats: SourceStats,
}

/// What one [`Scheduler::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    /// Polls issued.
    pub polled: usize,
    /// Records appended to the buffer.
    pub appended: usize,
    /// The motion sample acquired during this tick, if any.
    pub motion: Option<MemsData>,
}

/// Polls the enabled sources and appends their readings to the record buffer.
#[derive(Debug)]
pub struct Scheduler {
    slots: Vec<Slot>,
    poll_timeout: Duration,
    degrade_after: u32,
}

impl Scheduler {
    /// Creates a scheduler without any sources.
    pub fn new(config: &Config) -> Self {
        Self {
            slots: Vec::new(),
            poll_timeout: config.poll_timeout,
            degrade_after: config.degrade_after_failures,
        }
    }

    /// Installs the source for its kind, timed according to `config`.
    ///
    /// Fails if the kind is disabled in `config` or already installed.
    pub fn install(
        &mut self,
        config: &Config,
        source: Box<dyn SensorCapability>,
    ) -> Result<(), LoggerError> {
        let kind = source.kind();
        if !config.source_enabled(kind) {
            return Err(LoggerError::SourceDisabled(kind));
        }
        if self.slot(kind).is_some() {
            return Err(LoggerError::DuplicateSource(kind));
        }

        let retry_interval = config.retry_interval(kind);
        let timing = Timing {
            poll_interval: config.poll_interval(kind),
            retry_interval,
            degraded_interval: retry_interval * config.degraded_rate_divisor,
        };
        self.slots.push(Slot {
            kind,
            source,
            state: SourceState::Uninitialized,
            dead: false,
            timing,
            next_due: Instant::ZERO,
            consecutive_failures: 0,
            stats: SourceStats::default(),
        });
        self.slots.sort_by_key(|slot| slot.kind);
        Ok(())
    }

    /// Runs the initialization sequence of every source that has not been initialized yet.
    ///
    /// Sources already past initialization are left untouched, including their backoff state, so calling this again
    /// is harmless.
    pub fn initialize(&mut self, now: Instant) {
        for slot in &mut self.slots {
            if slot.state != SourceState::Uninitialized {
                continue;
            }

            slot.state = SourceState::Probing;
            tracing::debug!(source = %slot.kind, "initializing source");
            match slot.source.init() {
                Ok(()) => {
                    slot.state = SourceState::Active;
                    slot.next_due = now;
                    tracing::info!(source = %slot.kind, "source active");
                }
                Err(error) => {
                    slot.state = SourceState::Degraded;
                    slot.dead = true;
                    tracing::warn!(source = %slot.kind, %error, "source initialization failed");
                }
            }
        }
    }

    /// Polls every due source once and appends successful readings to `buffer` as records of `session`.
    pub fn tick(
        &mut self,
        now: Instant,
        clock: &mut Clock,
        session: &mut Session,
        buffer: &mut RecordBuffer,
    ) -> TickReport {
        let mut report = TickReport::default();
        for slot in &mut self.slots {
            if !slot.is_due(now) {
                continue;
            }
            report.polled += 1;
            let Some(reading) = slot.poll(now, self.poll_timeout, self.degrade_after, clock) else {
                continue;
            };

            if let Payload::Mems(sample) = &reading.payload {
                report.motion = Some(*sample);
            }
            let record = session.stamp(reading);
            tracing::trace!(source = %slot.kind, seq = record.seq, "reading appended");
            buffer.push(record);
            report.appended += 1;
        }
        report
    }

    /// Polls only the motion source, if it is due, without recording the reading.
    ///
    /// Used while the device sleeps and the rest of the acquisition loop is stopped.
    pub fn sample_motion(&mut self, now: Instant, clock: &mut Clock) -> Option<MemsData> {
        let poll_timeout = self.poll_timeout;
        let degrade_after = self.degrade_after;
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.kind == SourceKind::Mems)?;
        if !slot.is_due(now) {
            return None;
        }
        match slot.poll(now, poll_timeout, degrade_after, clock)?.payload {
            Payload::Mems(sample) => Some(sample),
            _ => None,
        }
    }

    /// State of the source of `kind`, if installed.
    pub fn state(&self, kind: SourceKind) -> Option<SourceState> {
        self.slot(kind).map(|slot| slot.state)
    }

    /// Poll counters of the source of `kind`, if installed.
    pub fn stats(&self, kind: SourceKind) -> Option<SourceStats> {
        self.slot(kind).map(|slot| slot.stats)
    }

    /// When the source of `kind` is next polled, if it is pollable.
    pub fn next_due(&self, kind: SourceKind) -> Option<Instant> {
        self.slot(kind)
            .filter(|slot| slot.pollable())
            .map(|slot| slot.next_due)
    }

    /// Installed sources with their states, in polling order.
    pub fn sources(&self) -> impl Iterator<Item = (SourceKind, SourceState)> + '_ {
        self.slots.iter().map(|slot| (slot.kind, slot.state))
    }

    fn slot(&self, kind: SourceKind) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.kind == kind)
    }
}

impl Slot {
    fn pollable(&self) -> bool {
        !self.dead && matches!(self.state, SourceState::Active | SourceState::Degraded)
    }

    fn is_due(&self, now: Instant) -> bool {
        self.pollable() && now >= self.next_due
    }

    /// Issues one poll and applies the retry policy to its outcome.
    fn poll(
        &mut self,
        now: Instant,
        timeout: Duration,
        degrade_after: u32,
        clock: &mut Clock,
    ) -> Option<Reading> {
        self.stats.polls += 1;
        match self.source.poll(timeout, clock.timestamp(now)) {
            Ok(mut reading) => {
                self.stats.readings += 1;
                if let Payload::Gnss(fix) = &reading.payload
                    && let Some(utc_millis) = fix.utc_millis
                    && reading.valid
                {
                    clock.sync(now, utc_millis);
                    reading.timestamp = clock.timestamp(now);
                }

                self.consecutive_failures = 0;
                if self.state == SourceState::Degraded {
                    self.state = SourceState::Active;
                    tracing::info!(source = %self.kind, "source recovered");
                }
                self.next_due = now + self.timing.poll_interval;
                Some(reading)
            }
            Err(PollError::ProtocolError) => {
                self.stats.protocol_errors += 1;
                tracing::debug!(source = %self.kind, "malformed data from source");
                self.next_due = now + self.current_interval();
                None
            }
            Err(error) => {
                let backoff = match error {
                    PollError::Timeout => {
                        self.stats.timeouts += 1;
                        self.timing.retry_interval / 2
                    }
                    _ => {
                        self.stats.unavailable += 1;
                        self.timing.retry_interval
                    }
                };
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                tracing::debug!(
                    source = %self.kind,
                    %error,
                    consecutive = self.consecutive_failures,
                    "poll failed"
                );

                if self.state == SourceState::Active && self.consecutive_failures >= degrade_after
                {
                    self.state = SourceState::Degraded;
                    tracing::warn!(
                        source = %self.kind,
                        failures = self.consecutive_failures,
                        "source degraded"
                    );
                }
                self.next_due = match self.state {
                    SourceState::Degraded => now + self.timing.degraded_interval,
                    _ => now + backoff,
                };
                None
            }
        }
    }

    fn current_interval(&self) -> Duration {
        match self.state {
            SourceState::Degraded => self.timing.degraded_interval,
            _ => self.timing.poll_interval,
        }
    }
}
