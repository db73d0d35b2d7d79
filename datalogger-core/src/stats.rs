//! Point-in-time counters of a running [`Datalogger`](crate::Datalogger).

use crate::motion::MotionState;
use crate::publish::TargetStats;
use crate::reading::SourceKind;
use crate::scheduler::{SourceState, SourceStats};
use crate::storage::{SinkCounters, SinkState};

/// State and poll counters of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSummary {
    /// Which source.
    pub kind: SourceKind,
    /// Lifecycle state.
    pub state: SourceState,
    /// Poll counters.
    pub counters: SourceStats,
}

/// A snapshot of every observable counter.
///
/// Subsystem failures never surface as errors once the logger runs; this is where they show up instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Id of the open Session.
    pub session: Option<u32>,
    /// Sequence number the next record of the open Session gets.
    pub next_seq: Option<u64>,
    /// Sessions opened since start.
    pub sessions: u64,
    /// Motion gate state, if the logger is motion gated.
    pub motion: Option<MotionState>,
    /// Records held by the buffer.
    pub buffer_len: usize,
    /// Records evicted because the buffer was full.
    pub overflow: u64,
    /// Installed sources in polling order.
    pub sources: Vec<SourceSummary>,
    /// Storage sink state.
    pub sink_state: SinkState,
    /// Storage sink counters.
    pub sink: SinkCounters,
    /// Records waiting for storage.
    pub storage_pending: usize,
    /// Records storage lost to buffer overflow.
    pub storage_missed: u64,
    /// Records left unwritten when a Session closed before storage caught up.
    pub abandoned: u64,
    /// Publish targets in registration order.
    pub targets: Vec<TargetStats>,
}

impl Stats {
    /// Summary of the source of `kind`, if installed.
    pub fn source(&self, kind: SourceKind) -> Option<&SourceSummary> {
        self.sources.iter().find(|source| source.kind == kind)
    }

    /// Statistics of the target called `name`, if registered.
    pub fn target(&self, name: &str) -> Option<&TargetStats> {
        self.targets.iter().find(|target| target.name == name)
    }
}
