//! Republishing of records to live consumers.
//!
//! Every [`PublishTarget`] reads the record buffer through its own cursor. [`FanOut`] pumps the targets from the
//! control loop with a bounded number of non-blocking sends per iteration: a target that cannot take data right now
//! simply falls behind, and once its cursor is overtaken by the ring it loses the oldest records instead of holding
//! up acquisition or storage.

use core::fmt::Debug;

use datalogger_osal_api::net::NetError;
use datalogger_osal_api::time::Instant;

use crate::buffer::{ConsumerId, RecordBuffer};
use crate::reading::Record;

mod ble;
pub mod nmea;
mod nmea_server;
mod serial;
pub mod text;

pub use self::ble::BleTarget;
pub use self::nmea_server::{NmeaServerTarget, ServerState};
pub use self::serial::SerialTarget;

/// A live consumer of records.
pub trait PublishTarget: Debug {
    /// Short name used in logs and statistics.
    fn name(&self) -> &'static str;

    /// Services the transport: connection management, client accept, join timeouts.
    ///
    /// Called once per loop iteration before any record is offered.
    fn service(&mut self, now: Instant) {
        let _ = now;
    }

    /// Returns `true` if records should be offered now.
    ///
    /// A target that is not ready keeps its cursor where it is.
    fn is_ready(&self) -> bool;

    /// Sends one record.
    ///
    /// [`NetError::WouldBlock`] and [`NetError::NotConnected`] keep the record for a later attempt; any other error
    /// drops it.
    fn publish(&mut self, record: &Record) -> Result<(), NetError>;
}

/// Delivery counters of one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetCounters {
    /// Records sent.
    pub sent: u64,
    /// Records dropped after a send error.
    pub dropped: u64,
}

/// Statistics of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetStats {
    /// Target name.
    pub name: &'static str,
    /// Delivery counters.
    pub counters: TargetCounters,
    /// Records lost to buffer overflow before the target read them.
    pub missed: u64,
    /// Records waiting in the buffer.
    pub pending: usize,
}

#[derive(Debug)]
struct Registered {
    consumer: ConsumerId,
    target: Box<dyn PublishTarget>,
    counters: TargetCounters,
}

/// The set of enabled publish targets.
#[derive(Debug)]
pub struct FanOut {
    targets: Vec<Registered>,
    per_tick: usize,
}

impl FanOut {
    /// Creates an empty fan-out offering at most `per_tick` records to each target per [`pump`](Self::pump).
    pub fn new(per_tick: usize) -> Self {
        Self {
            targets: Vec::new(),
            per_tick: per_tick.max(1),
        }
    }

    /// Adds `target` with a new cursor on `buffer`.
    pub fn add(&mut self, buffer: &mut RecordBuffer, target: Box<dyn PublishTarget>) {
        let consumer = buffer.register(target.name());
        tracing::debug!(target = target.name(), "publish target registered");
        self.targets.push(Registered {
            consumer,
            target,
            counters: TargetCounters::default(),
        });
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` if no target is enabled.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Services every target and offers each ready one its pending records.
    pub fn pump(&mut self, now: Instant, buffer: &mut RecordBuffer) {
        for registered in &mut self.targets {
            registered.target.service(now);
            if !registered.target.is_ready() {
                continue;
            }

            for _ in 0..self.per_tick {
                let Some(record) = buffer.peek_unconsumed(registered.consumer) else {
                    break;
                };
                match registered.target.publish(record) {
                    Ok(()) => registered.counters.sent += 1,
                    Err(NetError::WouldBlock | NetError::NotConnected) => break,
                    Err(error) => {
                        tracing::debug!(
                            target = registered.target.name(),
                            seq = record.seq,
                            %error,
                            "record dropped by publish target"
                        );
                        registered.counters.dropped += 1;
                    }
                }
                buffer.advance(registered.consumer);
            }
        }
    }

    /// Statistics of every target, in registration order.
    pub fn stats(&self, buffer: &RecordBuffer) -> Vec<TargetStats> {
        self.targets
            .iter()
            .map(|registered| TargetStats {
                name: registered.target.name(),
                counters: registered.counters,
                missed: buffer.missed(registered.consumer),
                pending: buffer.unconsumed(registered.consumer),
            })
            .collect()
    }
}
