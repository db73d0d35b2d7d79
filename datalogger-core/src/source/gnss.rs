use core::fmt::Debug;

use datalogger_osal_api::time::Duration;

use super::{InitError, PollError, SensorCapability};
use crate::clock::Timestamp;
use crate::config::GnssVariant;
use crate::reading::{GnssFix, Payload, Reading, SourceKind};

/// Driver for a GNSS receiver.
pub trait GnssReceiver: Debug {
    /// Powers the receiver up and opens its serial port at `baud_rate`.
    fn begin(&mut self, variant: GnssVariant, baud_rate: u32) -> Result<(), InitError>;

    /// Returns the latest fix, or `None` while the receiver has not produced one yet.
    fn read_fix(&mut self, timeout: Duration) -> Result<Option<GnssFix>, PollError>;
}

/// GNSS source.
///
/// Polls before the first fix (cold start) succeed with an invalid reading: the receiver is working, it just has no
/// position to report.
#[derive(Debug)]
pub struct GnssSource<R> {
    receiver: R,
    variant: GnssVariant,
    baud_rate: u32,
}

impl<R: GnssReceiver> GnssSource<R> {
    /// Creates a source for `variant` talking to `receiver` at `baud_rate`.
    pub fn new(receiver: R, variant: GnssVariant, baud_rate: u32) -> Self {
        Self {
            receiver,
            variant,
            baud_rate,
        }
    }
}

impl<R: GnssReceiver> SensorCapability for GnssSource<R> {
    fn kind(&self) -> SourceKind {
        SourceKind::Gnss
    }

    fn init(&mut self) -> Result<(), InitError> {
        self.receiver.begin(self.variant, self.baud_rate)?;
        tracing::info!(variant = ?self.variant, baud_rate = self.baud_rate, "GNSS receiver up");
        Ok(())
    }

    fn poll(&mut self, timeout: Duration, at: Timestamp) -> Result<Reading, PollError> {
        let reading = match self.receiver.read_fix(timeout)? {
            Some(fix) if fix.quality.has_position() => Reading::new(at, Payload::Gnss(fix)),
            Some(fix) => Reading::invalid(at, Payload::Gnss(fix)),
            None => Reading::invalid(at, Payload::Gnss(GnssFix::default())),
        };
        Ok(reading)
    }
}
