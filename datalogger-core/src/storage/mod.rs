//! Durable persistence of records.
//!
//! The [`Sink`] trait is the one interface the rest of the core writes through. [`Storage`] selects the
//! implementation from the configured backend once at start-up: a [`MediumSink`] framing records onto a
//! [`StorageMedium`], or a [`NullSink`] that accepts and discards everything.

use datalogger_osal_api::storage::{StorageError, StorageMedium};

use crate::config::{Config, StorageBackend};
use crate::reading::Record;

pub mod frame;
mod sink;

pub use self::sink::{MediumSink, NullSink};

/// Lifecycle state of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No Session log is open.
    Closed,
    /// Appends go to the current Session log.
    Open,
    /// Writing stopped after repeated failures; appends are dropped until [`Sink::reset`].
    Suspended,
}

/// Counters kept by a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCounters {
    /// Records accepted.
    pub written: u64,
    /// Records dropped while suspended or without an open Session.
    pub dropped: u64,
    /// Invalid readings that were not persisted.
    pub skipped_invalid: u64,
    /// Failed medium operations.
    pub failures: u64,
    /// Bytes handed to the medium, framing included.
    pub bytes: u64,
}

/// An append-only record writer.
pub trait Sink {
    /// Opens the log of `session_id`, closing any log still open.
    fn open_session(&mut self, session_id: u32) -> Result<(), StorageError>;

    /// Persists `record`.
    ///
    /// Invalid readings are skipped and reported as success. A failed append leaves nothing to clean up: the caller
    /// may hand the same record again.
    fn append(&mut self, record: &Record) -> Result<(), StorageError>;

    /// Pushes buffered bytes to the medium.
    fn flush(&mut self) -> Result<(), StorageError>;

    /// Flushes and closes the current log. Always succeeds.
    fn close_session(&mut self);

    /// Leaves the suspended state, for example after the medium was reinserted.
    fn reset(&mut self);

    /// Current state.
    fn state(&self) -> SinkState;

    /// Current counters.
    fn counters(&self) -> SinkCounters;
}

/// The configured storage backend.
#[derive(Debug)]
pub enum Storage<M: StorageMedium> {
    /// SD card or SPIFFS.
    Medium(MediumSink<M>),
    /// Persistence disabled.
    None(NullSink),
}

impl<M: StorageMedium> Storage<M> {
    /// Selects the backend named by `config`.
    ///
    /// `medium` is only used when the backend is not [`StorageBackend::None`].
    pub fn from_config(config: &Config, medium: M) -> Self {
        match config.storage {
            StorageBackend::None => Storage::None(NullSink::new()),
            StorageBackend::Sd | StorageBackend::Spiffs => {
                Storage::Medium(MediumSink::new(medium, config.storage_max_failures))
            }
        }
    }

    fn inner(&self) -> &dyn Sink {
        match self {
            Storage::Medium(sink) => sink,
            Storage::None(sink) => sink,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Sink {
        match self {
            Storage::Medium(sink) => sink,
            Storage::None(sink) => sink,
        }
    }
}

impl<M: StorageMedium> Sink for Storage<M> {
    fn open_session(&mut self, session_id: u32) -> Result<(), StorageError> {
        self.inner_mut().open_session(session_id)
    }

    fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        self.inner_mut().append(record)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.inner_mut().flush()
    }

    fn close_session(&mut self) {
        self.inner_mut().close_session()
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }

    fn state(&self) -> SinkState {
        self.inner().state()
    }

    fn counters(&self) -> SinkCounters {
        self.inner().counters()
    }
}
