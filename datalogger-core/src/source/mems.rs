use core::fmt::Debug;

use datalogger_osal_api::time::Duration;

use super::{InitError, PollError, SensorCapability};
use crate::clock::Timestamp;
use crate::config::MemsVariant;
use crate::reading::{MemsData, Payload, Reading, SourceKind};

/// Driver for a motion sensor.
pub trait MotionSensor: Debug {
    /// Configures the sensor for `variant`.
    fn begin(&mut self, variant: MemsVariant) -> Result<(), InitError>;

    /// Reads one sample.
    fn read(&mut self, timeout: Duration) -> Result<MemsData, PollError>;
}

/// Motion sensor source.
///
/// Samples are reduced to what the configured variant actually measures, so an accelerometer-only build never
/// reports gyro values left over in a driver's buffers.
#[derive(Debug)]
pub struct MemsSource<S> {
    sensor: S,
    variant: MemsVariant,
}

impl<S: MotionSensor> MemsSource<S> {
    /// Creates a source for `variant` reading from `sensor`.
    pub fn new(sensor: S, variant: MemsVariant) -> Self {
        Self { sensor, variant }
    }
}

impl<S: MotionSensor> SensorCapability for MemsSource<S> {
    fn kind(&self) -> SourceKind {
        SourceKind::Mems
    }

    fn init(&mut self) -> Result<(), InitError> {
        if self.variant == MemsVariant::Disabled {
            return Err(InitError::WrongVariant {
                expected: "motion sensor",
            });
        }
        self.sensor.begin(self.variant)?;
        tracing::info!(variant = ?self.variant, "motion sensor up");
        Ok(())
    }

    fn poll(&mut self, timeout: Duration, at: Timestamp) -> Result<Reading, PollError> {
        let mut sample = self.sensor.read(timeout)?;
        if sample.accel.iter().any(|axis| !axis.is_finite()) {
            return Err(PollError::ProtocolError);
        }

        match self.variant {
            MemsVariant::Accelerometer => {
                sample.gyro = [0.0; 3];
                sample.orientation = None;
            }
            MemsVariant::NineDof => sample.orientation = None,
            MemsVariant::Dmp | MemsVariant::Disabled => {}
        }
        Ok(Reading::new(at, Payload::Mems(sample)))
    }
}
