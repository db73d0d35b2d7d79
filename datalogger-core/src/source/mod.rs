//! Sensor sources.
//!
//! A sensor source wraps one capability (OBD-II, GNSS or MEMS) behind [`SensorCapability`]. The concrete sources in
//! this module adapt a hardware driver trait to that interface; the driver itself (PID decoding, NMEA parsing,
//! register access) lives outside the core.

use core::fmt::Debug;

use datalogger_osal_api::time::Duration;

use crate::clock::Timestamp;
use crate::reading::{Reading, SourceKind};

mod gnss;
mod mems;
mod obd;

pub use self::gnss::{GnssReceiver, GnssSource};
pub use self::mems::{MemsSource, MotionSensor};
pub use self::obd::{ObdLink, ObdSource};

/// Errors from a capability's initialization sequence.
///
/// A source whose initialization fails is never polled again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The device did not answer.
    #[error("the device did not respond")]
    NotResponding,

    /// The device answered but is not the configured variant.
    #[error("the device is not a {expected}")]
    WrongVariant {
        /// The configured variant.
        expected: &'static str,
    },

    /// None of the configured OBD-II PIDs is supported by the vehicle.
    #[error("the vehicle supports none of the configured PIDs")]
    NoSupportedPids,

    /// Driver specific failure.
    #[error("driver error: {0}")]
    Driver(String),
}

/// Errors from a single poll. All of them are recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum PollError {
    /// The capability is temporarily unavailable; retry later.
    #[error("the capability is unavailable")]
    Unavailable,

    /// The capability did not answer within the poll timeout; retry sooner.
    #[error("the poll timed out")]
    Timeout,

    /// The capability answered with malformed data.
    #[error("the capability returned malformed data")]
    ProtocolError,
}

/// One sensor capability as seen by the acquisition scheduler.
///
/// # Example
///
/// ```
/// use datalogger_core::clock::Timestamp;
/// use datalogger_core::reading::{MemsData, Payload, Reading, SourceKind};
/// use datalogger_core::source::{InitError, PollError, SensorCapability};
/// use datalogger_osal_api::time::Duration;
///
/// #[derive(Debug)]
/// struct Level;
///
/// impl SensorCapability for Level {
///     fn kind(&self) -> SourceKind {
///         SourceKind::Mems
///     }
///
///     fn init(&mut self) -> Result<(), InitError> {
///         Ok(())
///     }
///
///     fn poll(&mut self, _timeout: Duration, at: Timestamp) -> Result<Reading, PollError> {
///         let sample = MemsData { accel: [0.0, 0.0, 1.0], ..MemsData::default() };
///         Ok(Reading::new(at, Payload::Mems(sample)))
///     }
/// }
/// ```
pub trait SensorCapability: Debug {
    /// The kind of readings this source produces.
    fn kind(&self) -> SourceKind;

    /// Runs the capability's initialization sequence. Called once before the first poll.
    fn init(&mut self) -> Result<(), InitError>;

    /// Requests one reading acquired at `at`, blocking for at most `timeout`.
    fn poll(&mut self, timeout: Duration, at: Timestamp) -> Result<Reading, PollError>;
}
