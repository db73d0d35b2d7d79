use datalogger_osal_api::storage::{StorageError, StorageMedium};

use super::{Sink, SinkCounters, SinkState, frame};
use crate::reading::Record;

/// Frames records onto a [`StorageMedium`].
///
/// Failed medium operations are retried by handing the record again. After `max_failures` consecutive failures the
/// sink suspends itself: the log is closed and further records are dropped and counted until [`Sink::reset`] is
/// called. Suspension survives Session changes.
#[derive(Debug)]
pub struct MediumSink<M: StorageMedium> {
    medium: M,
    handle: Option<M::Handle>,
    session: Option<u32>,
    suspended: bool,
    consecutive_failures: u32,
    max_failures: u32,
    counters: SinkCounters,
}

impl<M: StorageMedium> MediumSink<M> {
    /// Creates a closed sink writing to `medium`.
    pub fn new(medium: M, max_failures: u32) -> Self {
        Self {
            medium,
            handle: None,
            session: None,
            suspended: false,
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
            counters: SinkCounters::default(),
        }
    }

    /// The underlying medium.
    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// Consecutive failures since the last successful operation.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn ensure_open(&mut self, session: u32) -> Result<(), StorageError> {
        if self.handle.is_none() {
            self.handle = Some(self.medium.open(session)?);
            tracing::debug!(session, "storage log opened");
        }
        Ok(())
    }

    fn write(&mut self, session: u32, bytes: &[u8]) -> Result<(), StorageError> {
        self.ensure_open(session)?;
        match self.handle.as_mut() {
            Some(handle) => self.medium.append(handle, bytes),
            None => Err(StorageError::MediumAbsent),
        }
    }

    fn record_failure(&mut self, error: StorageError) {
        self.counters.failures += 1;
        self.consecutive_failures += 1;
        tracing::warn!(
            %error,
            consecutive = self.consecutive_failures,
            limit = self.max_failures,
            "storage write failed"
        );

        if error == StorageError::MediumAbsent {
            self.release_handle();
        }
        if self.consecutive_failures >= self.max_failures {
            self.suspended = true;
            self.release_handle();
            tracing::warn!(session = ?self.session, "storage suspended");
        }
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.medium.close(handle);
        }
    }
}

impl<M: StorageMedium> Sink for MediumSink<M> {
    fn open_session(&mut self, session_id: u32) -> Result<(), StorageError> {
        self.close_session();
        self.session = Some(session_id);
        if self.suspended {
            return Err(StorageError::Suspended);
        }

        match self.ensure_open(session_id) {
            Ok(()) => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(error) => {
                self.record_failure(error);
                Err(error)
            }
        }
    }

    fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        if !record.reading.valid {
            self.counters.skipped_invalid += 1;
            return Ok(());
        }
        if self.suspended {
            self.counters.dropped += 1;
            return Err(StorageError::Suspended);
        }
        let Some(session) = self.session else {
            self.counters.dropped += 1;
            return Err(StorageError::MediumAbsent);
        };

        let bytes = match frame::encode(record) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(%error, seq = record.seq, "record cannot be framed");
                self.record_failure(StorageError::WriteFailed);
                return Err(StorageError::WriteFailed);
            }
        };

        match self.write(session, &bytes) {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.counters.written += 1;
                self.counters.bytes += bytes.len() as u64;
                tracing::trace!(session, seq = record.seq, "record persisted");
                Ok(())
            }
            Err(error) => {
                self.record_failure(error);
                Err(error)
            }
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        self.medium.flush(handle).inspect_err(|error| {
            tracing::warn!(%error, "storage flush failed");
        })
    }

    fn close_session(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(error) = self.medium.flush(&mut handle) {
                tracing::warn!(%error, "storage flush failed while closing");
            }
            self.medium.close(handle);
        }
        if let Some(session) = self.session.take() {
            tracing::debug!(session, "storage log closed");
        }
    }

    fn reset(&mut self) {
        if self.suspended {
            tracing::info!("storage resumed");
        }
        self.suspended = false;
        self.consecutive_failures = 0;
    }

    fn state(&self) -> SinkState {
        if self.suspended {
            SinkState::Suspended
        } else if self.session.is_some() {
            SinkState::Open
        } else {
            SinkState::Closed
        }
    }

    fn counters(&self) -> SinkCounters {
        self.counters
    }
}

/// Accepts every record and keeps nothing.
#[derive(Debug, Default)]
pub struct NullSink {
    open: bool,
    counters: SinkCounters,
}

impl NullSink {
    /// Creates a closed sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for NullSink {
    fn open_session(&mut self, _session_id: u32) -> Result<(), StorageError> {
        self.open = true;
        Ok(())
    }

    fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        if record.reading.valid {
            self.counters.written += 1;
        } else {
            self.counters.skipped_invalid += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn close_session(&mut self) {
        self.open = false;
    }

    fn reset(&mut self) {}

    fn state(&self) -> SinkState {
        if self.open {
            SinkState::Open
        } else {
            SinkState::Closed
        }
    }

    fn counters(&self) -> SinkCounters {
        self.counters
    }
}
