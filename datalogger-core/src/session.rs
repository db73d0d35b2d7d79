//! Logging sessions.

use crate::clock::Timestamp;
use crate::reading::{Reading, Record};

/// One continuous logging interval, from wake-up (or power-on) to sleep (or shutdown).
///
/// A Session hands out sequence numbers. They start at 0 and strictly increase across all sources, so records from
/// different sensors can be merged back into acquisition order.
#[derive(Debug, Clone)]
pub struct Session {
    id: u32,
    started_at: Timestamp,
    next_seq: u64,
}

impl Session {
    /// Starts session `id` at `started_at`.
    pub fn new(id: u32, started_at: Timestamp) -> Self {
        Self {
            id,
            started_at,
            next_seq: 0,
        }
    }

    /// The session identifier, also used to name the storage log.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// When the session started.
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// The sequence number the next record will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Wraps `reading` into the next record of this session.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_core::clock::Timestamp;
    /// use datalogger_core::reading::{MemsData, Payload, Reading};
    /// use datalogger_core::session::Session;
    /// use datalogger_osal_api::time::Instant;
    ///
    /// let start = Timestamp::monotonic(Instant::ZERO);
    /// let mut session = Session::new(7, start);
    ///
    /// let first = session.stamp(Reading::new(start, Payload::Mems(MemsData::default())));
    /// let second = session.stamp(Reading::new(start, Payload::Mems(MemsData::default())));
    ///
    /// assert_eq!((first.session, first.seq), (7, 0));
    /// assert_eq!((second.session, second.seq), (7, 1));
    /// ```
    pub fn stamp(&mut self, reading: Reading) -> Record {
        let seq = self.next_seq;
        self.next_seq += 1;
        Record {
            session: self.id,
            seq,
            reading,
        }
    }
}
