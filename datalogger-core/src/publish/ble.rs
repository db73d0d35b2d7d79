use datalogger_osal_api::net::{NetError, SppServer};
use datalogger_osal_api::time::{Duration, Instant};

use super::{PublishTarget, text};
use crate::reading::Record;

/// Delay before retrying a failed advertising start.
const START_RETRY: Duration = Duration::from_secs(5);

/// Streams text lines to a BLE serial port profile central.
///
/// While nobody is connected the target is not ready and its cursor falls behind.
#[derive(Debug)]
pub struct BleTarget<S> {
    server: S,
    profile: String,
    started: bool,
    retry_at: Instant,
}

impl<S: SppServer> BleTarget<S> {
    /// Creates a target advertising `profile` on `server`.
    pub fn new(server: S, profile: impl Into<String>) -> Self {
        Self {
            server,
            profile: profile.into(),
            started: false,
            retry_at: Instant::ZERO,
        }
    }
}

impl<S: SppServer + core::fmt::Debug> PublishTarget for BleTarget<S> {
    fn name(&self) -> &'static str {
        "ble"
    }

    fn service(&mut self, now: Instant) {
        if self.started || now < self.retry_at {
            return;
        }
        match self.server.start(&self.profile) {
            Ok(()) => {
                self.started = true;
                tracing::info!(profile = %self.profile, "BLE SPP server advertising");
            }
            Err(error) => {
                self.retry_at = now + START_RETRY;
                tracing::warn!(%error, "BLE SPP server failed to start");
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.started && self.server.is_connected()
    }

    fn publish(&mut self, record: &Record) -> Result<(), NetError> {
        self.server.send(text::format_line(record).as_bytes())
    }
}
