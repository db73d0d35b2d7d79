use core::fmt::Debug;

use datalogger_osal_api::time::Duration;

use super::{InitError, PollError, SensorCapability};
use crate::clock::Timestamp;
use crate::reading::{ObdData, Payload, PidValue, Reading, SourceKind};

/// Driver for an OBD-II adapter.
pub trait ObdLink: Debug {
    /// Brings the adapter up and negotiates the bus protocol.
    fn connect(&mut self) -> Result<(), InitError>;

    /// Returns whether the vehicle reports `pid` as supported.
    fn is_supported(&mut self, pid: u16) -> Result<bool, PollError>;

    /// Reads and decodes `pid`, waiting at most `timeout`.
    fn read_pid(&mut self, pid: u16, timeout: Duration) -> Result<i32, PollError>;
}

/// OBD-II source querying a fixed PID list.
#[derive(Debug)]
pub struct ObdSource<L> {
    link: L,
    configured: Vec<u16>,
    supported: Vec<u16>,
}

impl<L: ObdLink> ObdSource<L> {
    /// Creates a source querying `pids` over `link`.
    pub fn new(link: L, pids: &[u16]) -> Self {
        Self {
            link,
            configured: pids.to_vec(),
            supported: Vec::new(),
        }
    }

    /// PIDs found supported during initialization.
    pub fn supported_pids(&self) -> &[u16] {
        &self.supported
    }
}

impl<L: ObdLink> SensorCapability for ObdSource<L> {
    fn kind(&self) -> SourceKind {
        SourceKind::Obd
    }

    fn init(&mut self) -> Result<(), InitError> {
        self.link.connect()?;

        self.supported.clear();
        for &pid in &self.configured {
            match self.link.is_supported(pid) {
                Ok(true) => self.supported.push(pid),
                Ok(false) => tracing::debug!(pid = format_args!("{pid:#04x}"), "PID not supported"),
                Err(error) => {
                    tracing::debug!(pid = format_args!("{pid:#04x}"), %error, "PID probe failed")
                }
            }
        }

        if self.supported.is_empty() {
            return Err(InitError::NoSupportedPids);
        }
        tracing::info!(supported = ?self.supported, "OBD-II link up");
        Ok(())
    }

    fn poll(&mut self, timeout: Duration, at: Timestamp) -> Result<Reading, PollError> {
        // The budget is shared so one poll never exceeds `timeout` in total.
        let count = self.supported.len().max(1) as u32;
        let per_pid = (timeout / count).max(Duration::from_millis(1));

        let mut values = Vec::with_capacity(self.supported.len());
        // The last failure other than a protocol error, if any.
        let mut link_error = None;
        for &pid in &self.supported {
            match self.link.read_pid(pid, per_pid) {
                Ok(value) => values.push(PidValue { pid, value }),
                Err(error) => {
                    tracing::trace!(pid = format_args!("{pid:#04x}"), %error, "PID read failed");
                    if error != PollError::ProtocolError {
                        link_error = Some(error);
                    }
                }
            }
        }

        if values.is_empty() {
            // Garbled answers alone mean the link itself is up.
            return Err(match link_error {
                None if !self.supported.is_empty() => PollError::ProtocolError,
                Some(PollError::Timeout) => PollError::Timeout,
                _ => PollError::Unavailable,
            });
        }
        Ok(Reading::new(at, Payload::Obd(ObdData { values })))
    }
}
