//! # `datalogger-core`
//!
//! The acquisition, buffering, persistence and republishing core of a vehicle telemetry datalogger.
//!
//! Sensor sources (OBD-II, GNSS, MEMS) are polled by a single cooperative control loop. Every reading becomes a
//! [`Record`](reading::Record) in a bounded ring with one cursor per consumer: the storage sink writes records to a
//! crash-safe log, and each publish target (serial text, BLE SPP, WiFi NMEA TCP server) streams them at its own pace.
//! A motion gate optionally puts the whole pipeline to sleep while the vehicle is parked.
//!
//! Platform services (time, storage medium, transports) come from `datalogger-osal-api` implementations; sensor
//! drivers plug in through the [`ObdLink`](source::ObdLink), [`GnssReceiver`](source::GnssReceiver) and
//! [`MotionSensor`](source::MotionSensor) traits.
//!
//! ## Feature Flags
//!
//! - `test-helpers` - Scriptable sensors and in-memory platform mocks, for tests of this and downstream crates
//!
//! ## Basic Usage
//!
//! ```rust
//! use datalogger_core::Datalogger;
//! use datalogger_core::config::Config;
//! use datalogger_core::publish::SerialTarget;
//! use datalogger_core::reading::SourceKind;
//! use datalogger_core::test_helpers::{
//!     CapturePort, ManualTime, MemoryMedium, ScriptedSensor, obd_payload,
//! };
//! use datalogger_osal_api::time::Duration;
//!
//! # fn main() -> Result<(), datalogger_core::LoggerError> {
//! let config = Config {
//!     serial_out: true,
//!     ..Config::default()
//! };
//! let time = ManualTime::new();
//! let mut logger = Datalogger::new(config, time.clone(), MemoryMedium::new())?;
//!
//! logger.install_source(Box::new(ScriptedSensor::always(
//!     SourceKind::Obd,
//!     obd_payload(0x0D, 88),
//! )))?;
//! logger.add_target(Box::new(SerialTarget::new(CapturePort::new())))?;
//! logger.start()?;
//!
//! for _ in 0..10 {
//!     logger.tick();
//!     time.advance(Duration::from_millis(500));
//! }
//! logger.shutdown();
//!
//! assert_eq!(logger.stats().sink.written, 10);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod buffer;
pub mod clock;
pub mod config;
mod error;
mod logger;
pub mod motion;
pub mod publish;
pub mod reading;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod stats;
pub mod storage;
#[cfg(any(test, feature = "test-helpers"))]
#[doc(hidden)]
pub mod test_helpers;

pub use error::LoggerError;
pub use logger::Datalogger;
