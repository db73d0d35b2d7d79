//! Readings and records.
//!
//! A [`Reading`] is what a sensor source produces; a [`Record`] is a reading after the scheduler has stamped it with
//! its Session and sequence number. Records are what the record buffer holds and what storage persists.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// The capability a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    /// The vehicle's OBD-II bus.
    Obd,
    /// The satellite positioning receiver.
    Gnss,
    /// The motion sensor.
    Mems,
}

impl SourceKind {
    /// All kinds, in scheduler polling order.
    pub const ALL: [SourceKind; 3] = [SourceKind::Obd, SourceKind::Gnss, SourceKind::Mems];

    /// Short upper-case tag used in text output.
    pub const fn tag(self) -> &'static str {
        match self {
            SourceKind::Obd => "OBD",
            SourceKind::Gnss => "GNSS",
            SourceKind::Mems => "MEMS",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One decoded OBD-II parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidValue {
    /// Parameter identifier (mode 01).
    pub pid: u16,
    /// Decoded value in the PID's engineering unit.
    pub value: i32,
}

/// Values read from the OBD-II bus in one poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObdData {
    /// Values in the order the PIDs were queried.
    pub values: Vec<PidValue>,
}

/// GNSS fix quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FixQuality {
    /// No position.
    #[default]
    NoFix,
    /// Two-dimensional fix.
    Fix2d,
    /// Three-dimensional fix.
    Fix3d,
    /// Differentially corrected fix.
    Differential,
}

impl FixQuality {
    /// Returns `true` if the fix carries a usable position.
    pub const fn has_position(self) -> bool {
        !matches!(self, FixQuality::NoFix)
    }
}

/// A GNSS position fix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GnssFix {
    /// Latitude in degrees, north positive.
    pub lat: f64,
    /// Longitude in degrees, east positive.
    pub lon: f64,
    /// Altitude above mean sea level in meters.
    pub alt: f32,
    /// Ground speed in km/h.
    pub speed: f32,
    /// Course over ground in degrees from true north.
    pub heading: f32,
    /// Fix quality.
    pub quality: FixQuality,
    /// Satellites used in the fix.
    pub satellites: u8,
    /// UTC time of the fix in milliseconds since the Unix epoch, when the receiver reports it.
    pub utc_millis: Option<u64>,
}

/// Orientation computed by a motion processor, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation about the vertical axis.
    pub yaw: f32,
    /// Rotation about the lateral axis.
    pub pitch: f32,
    /// Rotation about the longitudinal axis.
    pub roll: f32,
}

/// One motion sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemsData {
    /// Acceleration in g.
    pub accel: [f32; 3],
    /// Angular rate in degrees per second; zero for accelerometer-only sensors.
    pub gyro: [f32; 3],
    /// Orientation, when the sensor computes it.
    pub orientation: Option<Orientation>,
}

/// Source-specific content of a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// OBD-II PID values.
    Obd(ObdData),
    /// A GNSS fix.
    Gnss(GnssFix),
    /// A motion sample.
    Mems(MemsData),
}

impl Payload {
    /// The source kind that produces this payload.
    pub const fn kind(&self) -> SourceKind {
        match self {
            Payload::Obd(_) => SourceKind::Obd,
            Payload::Gnss(_) => SourceKind::Gnss,
            Payload::Mems(_) => SourceKind::Mems,
        }
    }
}

/// One timestamped observation.
///
/// A reading with `valid == false` (for example a GNSS poll before the first fix) still counts as a successful poll,
/// but is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the reading was acquired.
    pub timestamp: Timestamp,
    /// What was read.
    pub payload: Payload,
    /// Whether the content is usable.
    pub valid: bool,
}

impl Reading {
    /// Creates a valid reading.
    pub fn new(timestamp: Timestamp, payload: Payload) -> Self {
        Self {
            timestamp,
            payload,
            valid: true,
        }
    }

    /// Creates a reading flagged as not usable.
    pub fn invalid(timestamp: Timestamp, payload: Payload) -> Self {
        Self {
            timestamp,
            payload,
            valid: false,
        }
    }

    /// The source this reading came from.
    pub const fn source(&self) -> SourceKind {
        self.payload.kind()
    }
}

/// A reading stamped with its position in a Session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Session the record belongs to.
    pub session: u32,
    /// Position in the Session, strictly increasing from 0.
    pub seq: u64,
    /// The reading.
    pub reading: Reading,
}

#[cfg(test)]
mod tests {
    use datalogger_osal_api::time::Instant;

    use super::*;

    #[test]
    fn source_follows_payload() {
        let timestamp = Timestamp::monotonic(Instant::from_millis(5));
        let reading = Reading::new(timestamp, Payload::Mems(MemsData::default()));
        assert_eq!(reading.source(), SourceKind::Mems);
        assert!(reading.valid);

        let reading = Reading::invalid(timestamp, Payload::Gnss(GnssFix::default()));
        assert_eq!(reading.source(), SourceKind::Gnss);
        assert!(!reading.valid);
    }

    #[test]
    fn tags_are_upper_case() {
        let tags: Vec<_> = SourceKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(tags, ["OBD", "GNSS", "MEMS"]);
    }
}
