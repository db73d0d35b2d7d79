//! The control loop tying sources, buffer, storage and publishing together.

use datalogger_osal_api::storage::{StorageError, StorageMedium};
use datalogger_osal_api::time::{Instant, TimeAbstraction};

use crate::buffer::{ConsumerId, RecordBuffer};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::LoggerError;
use crate::motion::{MotionGate, MotionState, Transition};
use crate::publish::{FanOut, PublishTarget};
use crate::reading::SourceKind;
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::source::SensorCapability;
use crate::stats::{SourceSummary, Stats};
use crate::storage::{Sink, Storage};

/// Outcome of one storage drain pass.
#[derive(Debug, Clone, Copy, Default)]
struct Drain {
    handled: usize,
    stalled: bool,
}

/// A datalogger assembled from a configuration snapshot, a time source and a storage medium.
///
/// Sources and publish targets are added before [`start`](Self::start). After that the caller drives the logger by
/// calling [`tick`](Self::tick) at the configured stats interval until [`shutdown`](Self::shutdown).
///
/// One tick:
///
/// 1. While the motion gate sleeps, only the motion sensor is sampled; qualifying motion opens a Session.
/// 2. While a Session is open, due sources are polled into the record buffer and the gate checks for quiet.
/// 3. Storage writes a bounded number of pending records.
/// 4. Every publish target is serviced and offered a bounded number of pending records.
///
/// Without a motion sensor there is no gate: the Session opens at start and closes at shutdown.
#[derive(Debug)]
pub struct Datalogger<M: StorageMedium, T> {
    config: Config,
    time: T,
    clock: Clock,
    scheduler: Scheduler,
    buffer: RecordBuffer,
    storage: Storage<M>,
    storage_cursor: ConsumerId,
    fanout: FanOut,
    gate: Option<MotionGate>,
    session: Option<Session>,
    next_session_id: u32,
    sessions: u64,
    abandoned: u64,
    running: bool,
    last_report: Instant,
}

impl<M, T> Datalogger<M, T>
where
    M: StorageMedium,
    T: TimeAbstraction,
{
    /// Validates `config` and assembles an idle logger.
    pub fn new(config: Config, time: T, medium: M) -> Result<Self, LoggerError> {
        config.validate()?;

        let mut buffer = RecordBuffer::new(config.buffer_capacity);
        let storage_cursor = buffer.register("storage");
        let gate = config
            .motion_gated()
            .then(|| MotionGate::from_config(&config));

        Ok(Self {
            clock: Clock::new(),
            scheduler: Scheduler::new(&config),
            storage: Storage::from_config(&config, medium),
            fanout: FanOut::new(config.publish_per_tick),
            buffer,
            storage_cursor,
            gate,
            session: None,
            next_session_id: 1,
            sessions: 0,
            abandoned: 0,
            running: false,
            last_report: Instant::ZERO,
            config,
            time,
        })
    }

    /// Numbers Sessions from `base` instead of 1, for example to continue after the logs already on the medium.
    pub fn with_session_base(mut self, base: u32) -> Self {
        self.next_session_id = base;
        self
    }

    /// Installs the sensor source for its capability.
    pub fn install_source(
        &mut self,
        source: Box<dyn SensorCapability>,
    ) -> Result<(), LoggerError> {
        if self.running {
            return Err(LoggerError::AlreadyStarted);
        }
        self.scheduler.install(&self.config, source)
    }

    /// Adds a publish target.
    ///
    /// The built-in targets are rejected unless the configuration enables them.
    pub fn add_target(&mut self, target: Box<dyn PublishTarget>) -> Result<(), LoggerError> {
        if self.running {
            return Err(LoggerError::AlreadyStarted);
        }
        let name = target.name();
        let enabled = match name {
            "serial" => self.config.serial_out,
            "ble" => self.config.ble,
            "nmea" => self.config.nmea_server,
            _ => true,
        };
        if !enabled {
            return Err(LoggerError::TargetDisabled(name));
        }
        self.fanout.add(&mut self.buffer, target);
        Ok(())
    }

    /// Initializes the sources and, without a motion gate, opens the first Session.
    pub fn start(&mut self) -> Result<(), LoggerError> {
        if self.running {
            return Err(LoggerError::AlreadyStarted);
        }
        let now = self.time.now();
        self.running = true;
        self.last_report = now;
        self.scheduler.initialize(now);

        if self.gate.is_some() && self.scheduler.next_due(SourceKind::Mems).is_none() {
            tracing::warn!("motion sensor unavailable, logging without motion gate");
            self.gate = None;
        }

        tracing::info!(
            sources = self.scheduler.sources().count(),
            targets = self.fanout.len(),
            gated = self.gate.is_some(),
            "datalogger started"
        );
        if self.gate.is_none() {
            self.open_session(now);
        }
        Ok(())
    }

    /// Runs one iteration of the control loop.
    ///
    /// Does nothing before [`start`](Self::start) or after [`shutdown`](Self::shutdown).
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let now = self.time.now();

        if self.motion_state() == Some(MotionState::Sleep) {
            let woke = self
                .scheduler
                .sample_motion(now, &mut self.clock)
                .zip(self.gate.as_mut())
                .and_then(|(sample, gate)| gate.observe(now, sample.accel));
            if woke == Some(Transition::Woke) {
                self.open_session(now);
            }
        }

        if let Some(session) = &mut self.session {
            let report = self
                .scheduler
                .tick(now, &mut self.clock, session, &mut self.buffer);

            let mut slept = false;
            if let Some(gate) = &mut self.gate {
                let observed = report
                    .motion
                    .and_then(|sample| gate.observe(now, sample.accel));
                slept = observed == Some(Transition::Slept)
                    || gate.check_quiet(now) == Some(Transition::Slept);
            }
            if slept {
                self.close_session();
            }
        }

        self.drain_storage();
        self.fanout.pump(now, &mut self.buffer);

        if now.saturating_duration_since(self.last_report) >= self.config.stats_interval {
            self.last_report = now;
            self.report();
        }
    }

    /// Closes the open Session and stops the logger.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.close_session();
        let now = self.time.now();
        self.fanout.pump(now, &mut self.buffer);
        self.running = false;
        tracing::info!(sessions = self.sessions, "datalogger stopped");
    }

    /// Resumes storage after it was suspended, for example once the medium was replaced.
    pub fn reset_storage(&mut self) {
        self.storage.reset();
    }

    /// The configuration snapshot.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` between [`start`](Self::start) and [`shutdown`](Self::shutdown).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Motion gate state, if the logger is motion gated.
    pub fn motion_state(&self) -> Option<MotionState> {
        self.gate.as_ref().map(MotionGate::state)
    }

    /// The open Session.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The storage backend.
    pub fn storage(&self) -> &Storage<M> {
        &self.storage
    }

    /// A snapshot of all counters.
    pub fn stats(&self) -> Stats {
        Stats {
            session: self.session.as_ref().map(Session::id),
            next_seq: self.session.as_ref().map(Session::next_seq),
            sessions: self.sessions,
            motion: self.motion_state(),
            buffer_len: self.buffer.len(),
            overflow: self.buffer.overflow_count(),
            sources: self
                .scheduler
                .sources()
                .filter_map(|(kind, state)| {
                    Some(SourceSummary {
                        kind,
                        state,
                        counters: self.scheduler.stats(kind)?,
                    })
                })
                .collect(),
            sink_state: self.storage.state(),
            sink: self.storage.counters(),
            storage_pending: self.buffer.unconsumed(self.storage_cursor),
            storage_missed: self.buffer.missed(self.storage_cursor),
            abandoned: self.abandoned,
            targets: self.fanout.stats(&self.buffer),
        }
    }

    fn open_session(&mut self, now: Instant) {
        let id = self.next_session_id;
        self.next_session_id = id.wrapping_add(1);
        self.sessions += 1;
        self.session = Some(Session::new(id, self.clock.timestamp(now)));

        if let Err(error) = self.storage.open_session(id) {
            tracing::warn!(session = id, %error, "session log unavailable");
        }
        tracing::info!(session = id, "session opened");
    }

    /// Drains storage within the grace period, then force-closes the Session log.
    fn close_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let deadline = self.time.now() + self.config.drain_grace_period;

        let mut stalls = 0;
        while self.buffer.unconsumed(self.storage_cursor) > 0 {
            if self.time.now() >= deadline {
                tracing::warn!(session = session.id(), "drain grace period expired");
                break;
            }
            let drain = self.drain_storage();
            if drain.stalled {
                stalls += 1;
                if stalls > self.config.storage_max_failures {
                    break;
                }
            } else if drain.handled == 0 {
                break;
            }
        }

        let abandoned = self.buffer.skip_all(self.storage_cursor);
        if abandoned > 0 {
            self.abandoned += abandoned;
            tracing::warn!(session = session.id(), abandoned, "session closed before storage caught up");
        }
        if let Err(error) = self.storage.flush() {
            tracing::warn!(session = session.id(), %error, "final flush failed");
        }
        self.storage.close_session();
        tracing::info!(session = session.id(), records = session.next_seq(), "session closed");
    }

    /// Hands up to the configured number of pending records to storage.
    ///
    /// A failed write keeps the record for the next pass. Records a suspended sink refuses are consumed.
    fn drain_storage(&mut self) -> Drain {
        let mut drain = Drain::default();
        for _ in 0..self.config.storage_writes_per_tick {
            let Some(record) = self.buffer.peek_unconsumed(self.storage_cursor) else {
                break;
            };
            match self.storage.append(record) {
                Ok(()) | Err(StorageError::Suspended) => {
                    self.buffer.advance(self.storage_cursor);
                    drain.handled += 1;
                }
                Err(error) => {
                    tracing::trace!(%error, "storage write deferred");
                    drain.stalled = true;
                    break;
                }
            }
        }
        drain
    }

    fn report(&self) {
        let sink = self.storage.counters();
        tracing::debug!(
            session = ?self.session.as_ref().map(Session::id),
            buffered = self.buffer.len(),
            overflow = self.buffer.overflow_count(),
            sink = ?self.storage.state(),
            written = sink.written,
            dropped = sink.dropped,
            "stats"
        );
        for (kind, state) in self.scheduler.sources() {
            tracing::trace!(source = %kind, %state, "source state");
        }
    }
}

#[cfg(test)]
mod tests {
    use datalogger_osal_api::time::Duration;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{MemsVariant, StorageBackend};
    use crate::publish::SerialTarget;
    use crate::storage::SinkState;
    use crate::storage::frame;
    use crate::test_helpers::{
        CapturePort, ManualTime, MemoryMedium, ScriptedSensor, mems_payload, obd_payload,
    };

    fn obd_only() -> Config {
        Config {
            serial_out: true,
            ..Config::default()
        }
    }

    fn logger(config: Config) -> (Datalogger<MemoryMedium, ManualTime>, ManualTime, MemoryMedium) {
        let time = ManualTime::new();
        let medium = MemoryMedium::new();
        let logger = Datalogger::new(config, time.clone(), medium.clone()).unwrap();
        (logger, time, medium)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            buffer_capacity: 0,
            ..Config::default()
        };
        let error = Datalogger::new(config, ManualTime::new(), MemoryMedium::new()).unwrap_err();
        assert!(matches!(error, LoggerError::Config(_)));
    }

    #[test]
    fn assembly_is_closed_after_start() {
        let (mut logger, _, _) = logger(obd_only());
        logger.start().unwrap();

        let source = ScriptedSensor::new(SourceKind::Obd);
        assert!(matches!(
            logger.install_source(Box::new(source)),
            Err(LoggerError::AlreadyStarted)
        ));
        assert!(matches!(logger.start(), Err(LoggerError::AlreadyStarted)));
    }

    #[test]
    fn disabled_targets_are_rejected() {
        let (mut logger, _, _) = logger(Config::default());
        let error = logger
            .add_target(Box::new(SerialTarget::new(CapturePort::new())))
            .unwrap_err();
        assert!(matches!(error, LoggerError::TargetDisabled("serial")));
    }

    #[test]
    fn ungated_logger_persists_and_publishes() {
        let (mut logger, time, medium) = logger(obd_only());
        let port = CapturePort::new();
        logger
            .install_source(Box::new(ScriptedSensor::always(
                SourceKind::Obd,
                obd_payload(0x0D, 42),
            )))
            .unwrap();
        logger
            .add_target(Box::new(SerialTarget::new(port.clone())))
            .unwrap();
        logger.start().unwrap();
        assert_eq!(logger.session().map(Session::id), Some(1));

        for _ in 0..4 {
            logger.tick();
            time.advance(Duration::from_millis(500));
        }
        logger.shutdown();

        let seqs: Vec<u64> = frame::scan(&medium.log(1))
            .records
            .iter()
            .map(|record| record.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(port.lines().len(), 4);
        assert_eq!(logger.storage().state(), SinkState::Closed);
        assert!(!logger.is_running());
    }

    #[test]
    fn session_base_numbers_logs() {
        let (logger, _, medium) = logger(obd_only());
        let mut logger = logger.with_session_base(40);
        logger.start().unwrap();
        logger.shutdown();
        assert_eq!(medium.sessions(), vec![40]);
    }

    #[test]
    fn gate_falls_back_when_motion_sensor_is_dead() {
        let config = Config {
            mems: MemsVariant::Accelerometer,
            ..Config::default()
        };
        let (mut logger, _, _) = logger(config);
        logger
            .install_source(Box::new(
                ScriptedSensor::always(SourceKind::Mems, mems_payload([0.0, 0.0, 1.0]))
                    .failing_init(),
            ))
            .unwrap();
        logger.start().unwrap();

        assert_eq!(logger.motion_state(), None);
        assert!(logger.session().is_some());
    }

    #[test]
    fn close_abandons_what_storage_cannot_take_in_time() {
        let config = Config {
            storage_writes_per_tick: 1,
            ..obd_only()
        };
        let (mut logger, time, medium) = logger(config);
        logger
            .install_source(Box::new(ScriptedSensor::always(
                SourceKind::Obd,
                obd_payload(0x0C, 800),
            )))
            .unwrap();
        logger.start().unwrap();
        logger.tick();
        time.advance(Duration::from_millis(500));

        medium.fail_appends(StorageError::WriteFailed);
        logger.tick();
        time.advance(Duration::from_millis(500));
        logger.tick();
        logger.shutdown();

        let stats = logger.stats();
        assert_eq!(stats.sink.written, 1);
        assert_eq!(stats.abandoned + stats.sink.dropped, 2);
        assert_eq!(stats.storage_pending, 0);
    }

    #[test]
    fn null_storage_is_transparent() {
        let config = Config {
            storage: StorageBackend::None,
            ..obd_only()
        };
        let (mut logger, _, medium) = logger(config);
        logger
            .install_source(Box::new(ScriptedSensor::always(
                SourceKind::Obd,
                obd_payload(0x0C, 800),
            )))
            .unwrap();
        logger.start().unwrap();
        logger.tick();
        logger.shutdown();

        assert_eq!(logger.stats().sink.written, 1);
        assert!(medium.sessions().is_empty());
    }
}
