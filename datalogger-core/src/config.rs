//! The immutable configuration snapshot.
//!
//! A [`Config`] is resolved once at start-up (from build-time defaults or a snapshot handed over by the boot loader)
//! and then only ever borrowed. Nothing in the core mutates it; changing a value means building a new snapshot and
//! restarting the [`Datalogger`](crate::Datalogger).

use datalogger_osal_api::time::Duration;
use serde::{Deserialize, Serialize};

use crate::reading::SourceKind;

/// GNSS receiver variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GnssVariant {
    /// No GNSS receiver.
    #[default]
    Disabled,
    /// A standalone receiver on its own serial port.
    Standalone,
    /// The receiver integrated in a SIM5360/SIM7600 cellular module.
    Sim5360,
    /// The receiver integrated in a SIM7070 cellular module.
    Sim7070,
}

/// Motion sensor variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemsVariant {
    /// No motion sensor.
    #[default]
    Disabled,
    /// Accelerometer only.
    Accelerometer,
    /// Accelerometer, gyroscope and magnetometer.
    NineDof,
    /// Sensor with an on-chip motion processor that also reports orientation.
    Dmp,
}

/// Persistent storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// Persistence disabled; records are accepted and discarded.
    None,
    /// SD card.
    #[default]
    Sd,
    /// SPI flash file system.
    Spiffs,
}

/// Errors returned by [`Config::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An interval that drives a timer is zero.
    #[error("`{field}` must be greater than zero")]
    ZeroInterval {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A capacity or count is zero.
    #[error("`{field}` must be at least 1")]
    ZeroCount {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The wake-up threshold is not a positive, finite acceleration.
    #[error("wakeup motion threshold must be a positive number of g, got {0}")]
    InvalidMotionThreshold(f32),

    /// The NMEA server is enabled on port 0.
    #[error("the NMEA server needs a non-zero TCP port")]
    InvalidNmeaPort,

    /// The OBD source is enabled without any PID to query.
    #[error("OBD-II is enabled but no PIDs are configured")]
    NoObdPids,

    /// The snapshot could not be parsed.
    #[error("invalid configuration snapshot")]
    Parse(#[source] serde_json::Error),
}

/// The resolved feature flags, intervals and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Whether the OBD-II source is compiled in.
    pub obd: bool,
    /// GNSS receiver selection.
    pub gnss: GnssVariant,
    /// Motion sensor selection.
    pub mems: MemsVariant,
    /// Storage backend selection.
    pub storage: StorageBackend,
    /// Whether readings are echoed as text on the serial port.
    pub serial_out: bool,
    /// Whether the BLE SPP server is enabled.
    pub ble: bool,
    /// Whether the WiFi NMEA TCP server is enabled.
    pub nmea_server: bool,
    /// Port of the NMEA TCP server.
    pub nmea_tcp_port: u16,
    /// How long to wait for the WiFi association before giving up on a join attempt.
    pub wifi_join_timeout: Duration,
    /// Base rate of the acquisition loop and of the stats report.
    pub stats_interval: Duration,
    /// Backoff between OBD-II polls after a failure.
    pub obd_retry_interval: Duration,
    /// Baud rate of the GNSS serial port.
    pub gnss_baud_rate: u32,
    /// Acceleration change, in g, that wakes the device.
    pub wakeup_motion_threshold: f32,

    /// Regular OBD-II poll interval.
    pub obd_poll_interval: Duration,
    /// Regular GNSS poll interval.
    pub gnss_poll_interval: Duration,
    /// Regular MEMS poll interval.
    pub mems_poll_interval: Duration,
    /// Fixed backoff for GNSS and MEMS polls after a failure.
    pub sensor_retry_interval: Duration,
    /// Upper bound a single poll may block for.
    pub poll_timeout: Duration,
    /// Consecutive failed polls after which a source is degraded.
    pub degrade_after_failures: u32,
    /// Factor by which a degraded source's poll rate is reduced.
    pub degraded_rate_divisor: u32,
    /// PIDs queried on every OBD-II poll.
    pub obd_pids: Vec<u16>,

    /// Number of records the record buffer holds.
    pub buffer_capacity: usize,
    /// Consecutive failed appends after which storage is suspended.
    pub storage_max_failures: u32,
    /// Upper bound on records written to storage per loop iteration.
    pub storage_writes_per_tick: usize,
    /// Upper bound on records handed to each publish target per loop iteration.
    pub publish_per_tick: usize,

    /// Time without qualifying motion before the device goes back to sleep.
    pub motion_quiet_period: Duration,
    /// How long a session close may spend draining the buffer to storage.
    pub drain_grace_period: Duration,
    /// Maximum concurrent NMEA clients.
    pub nmea_max_clients: usize,
    /// BLE SPP profile name.
    pub ble_profile: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            obd: true,
            gnss: GnssVariant::Disabled,
            mems: MemsVariant::Disabled,
            storage: StorageBackend::Sd,
            serial_out: false,
            ble: false,
            nmea_server: false,
            nmea_tcp_port: 4000,
            wifi_join_timeout: Duration::from_millis(30_000),
            stats_interval: Duration::from_millis(500),
            obd_retry_interval: Duration::from_millis(3_000),
            gnss_baud_rate: 115_200,
            wakeup_motion_threshold: 0.3,

            obd_poll_interval: Duration::from_millis(500),
            gnss_poll_interval: Duration::from_millis(1_000),
            mems_poll_interval: Duration::from_millis(100),
            sensor_retry_interval: Duration::from_millis(1_000),
            poll_timeout: Duration::from_millis(200),
            degrade_after_failures: 3,
            degraded_rate_divisor: 4,
            // Engine RPM, vehicle speed, throttle position, coolant temperature.
            obd_pids: vec![0x0C, 0x0D, 0x11, 0x05],

            buffer_capacity: 256,
            storage_max_failures: 5,
            storage_writes_per_tick: 32,
            publish_per_tick: 32,

            motion_quiet_period: Duration::from_secs(60),
            drain_grace_period: Duration::from_millis(1_000),
            nmea_max_clients: 4,
            ble_profile: "datalogger".to_owned(),
        }
    }
}

impl Config {
    /// Parses a JSON snapshot, filling missing fields with defaults, and validates it.
    ///
    /// # Examples
    ///
    /// ```
    /// use datalogger_core::config::{Config, GnssVariant};
    ///
    /// let config = Config::from_json(r#"{ "gnss": "standalone", "nmea_tcp_port": 4100 }"#)?;
    /// assert_eq!(config.gnss, GnssVariant::Standalone);
    /// assert_eq!(config.nmea_tcp_port, 4100);
    /// assert!(config.obd);
    /// # Ok::<(), datalogger_core::config::ConfigError>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the snapshot can drive the core.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("stats_interval", self.stats_interval),
            ("obd_retry_interval", self.obd_retry_interval),
            ("obd_poll_interval", self.obd_poll_interval),
            ("gnss_poll_interval", self.gnss_poll_interval),
            ("mems_poll_interval", self.mems_poll_interval),
            ("sensor_retry_interval", self.sensor_retry_interval),
            ("poll_timeout", self.poll_timeout),
            ("motion_quiet_period", self.motion_quiet_period),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, interval)| interval.is_zero()) {
            return Err(ConfigError::ZeroInterval { field });
        }

        let counts = [
            ("buffer_capacity", self.buffer_capacity),
            ("storage_max_failures", self.storage_max_failures as usize),
            ("storage_writes_per_tick", self.storage_writes_per_tick),
            ("publish_per_tick", self.publish_per_tick),
            ("degrade_after_failures", self.degrade_after_failures as usize),
            ("degraded_rate_divisor", self.degraded_rate_divisor as usize),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, count)| *count == 0) {
            return Err(ConfigError::ZeroCount { field });
        }

        if !(self.wakeup_motion_threshold.is_finite() && self.wakeup_motion_threshold > 0.0) {
            return Err(ConfigError::InvalidMotionThreshold(
                self.wakeup_motion_threshold,
            ));
        }

        if self.nmea_server {
            if self.nmea_tcp_port == 0 {
                return Err(ConfigError::InvalidNmeaPort);
            }
            if self.nmea_max_clients == 0 {
                return Err(ConfigError::ZeroCount {
                    field: "nmea_max_clients",
                });
            }
            if self.wifi_join_timeout.is_zero() {
                return Err(ConfigError::ZeroInterval {
                    field: "wifi_join_timeout",
                });
            }
        }

        if self.obd && self.obd_pids.is_empty() {
            return Err(ConfigError::NoObdPids);
        }

        Ok(())
    }

    /// Returns whether the source of `kind` is compiled in.
    pub fn source_enabled(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Obd => self.obd,
            SourceKind::Gnss => self.gnss != GnssVariant::Disabled,
            SourceKind::Mems => self.mems != MemsVariant::Disabled,
        }
    }

    /// Enabled sources in the fixed order the scheduler polls them in.
    pub fn enabled_sources(&self) -> impl Iterator<Item = SourceKind> + '_ {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.source_enabled(*kind))
    }

    /// Regular poll interval of `kind`.
    pub fn poll_interval(&self, kind: SourceKind) -> Duration {
        match kind {
            SourceKind::Obd => self.obd_poll_interval,
            SourceKind::Gnss => self.gnss_poll_interval,
            SourceKind::Mems => self.mems_poll_interval,
        }
    }

    /// Backoff of `kind` after an `Unavailable` poll.
    pub fn retry_interval(&self, kind: SourceKind) -> Duration {
        match kind {
            SourceKind::Obd => self.obd_retry_interval,
            SourceKind::Gnss | SourceKind::Mems => self.sensor_retry_interval,
        }
    }

    /// Whether the motion gate supervises the acquisition loop.
    pub fn motion_gated(&self) -> bool {
        self.mems != MemsVariant::Disabled
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test]
    fn defaults_match_firmware_configuration() {
        let config = Config::default();
        assert!(config.obd);
        assert_eq!(config.gnss, GnssVariant::Disabled);
        assert_eq!(config.mems, MemsVariant::Disabled);
        assert_eq!(config.storage, StorageBackend::Sd);
        assert!(!config.serial_out);
        assert!(!config.ble);
        assert!(!config.nmea_server);
        assert_eq!(config.nmea_tcp_port, 4000);
        assert_eq!(config.wifi_join_timeout, Duration::from_millis(30_000));
        assert_eq!(config.stats_interval, Duration::from_millis(500));
        assert_eq!(config.obd_retry_interval, Duration::from_millis(3_000));
        assert_eq!(config.gnss_baud_rate, 115_200);
        assert_eq!(config.wakeup_motion_threshold, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_sources_follow_fixed_order() {
        let config = Config {
            gnss: GnssVariant::Sim7070,
            mems: MemsVariant::NineDof,
            ..Config::default()
        };
        let kinds: Vec<_> = config.enabled_sources().collect();
        assert_eq!(
            kinds,
            vec![SourceKind::Obd, SourceKind::Gnss, SourceKind::Mems]
        );

        let config = Config {
            obd: false,
            mems: MemsVariant::Accelerometer,
            ..Config::default()
        };
        let kinds: Vec<_> = config.enabled_sources().collect();
        assert_eq!(kinds, vec![SourceKind::Mems]);
    }

    #[test]
    fn retry_intervals_per_source() {
        let config = Config::default();
        assert_eq!(
            config.retry_interval(SourceKind::Obd),
            Duration::from_millis(3_000)
        );
        assert_eq!(
            config.retry_interval(SourceKind::Gnss),
            config.sensor_retry_interval
        );
        assert_eq!(
            config.retry_interval(SourceKind::Mems),
            config.sensor_retry_interval
        );
    }

    #[test_case(Config { stats_interval: Duration::ZERO, ..Config::default() }, ConfigError::ZeroInterval { field: "stats_interval" } ; "zero stats interval")]
    #[test_case(Config { buffer_capacity: 0, ..Config::default() }, ConfigError::ZeroCount { field: "buffer_capacity" } ; "zero buffer")]
    #[test_case(Config { wakeup_motion_threshold: -0.1, ..Config::default() }, ConfigError::InvalidMotionThreshold(-0.1) ; "negative threshold")]
    #[test_case(Config { nmea_server: true, nmea_tcp_port: 0, ..Config::default() }, ConfigError::InvalidNmeaPort ; "nmea port zero")]
    #[test_case(Config { obd_pids: Vec::new(), ..Config::default() }, ConfigError::NoObdPids ; "obd without pids")]
    fn rejects_invalid_snapshots(config: Config, expected: ConfigError) {
        let error = config.validate().unwrap_err();
        assert_eq!(error.to_string(), expected.to_string());
    }

    #[test]
    fn nmea_port_is_only_checked_when_server_enabled() {
        let config = Config {
            nmea_tcp_port: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_snapshot() {
        let config = Config::from_json(
            r#"{
                "storage": "spiffs",
                "mems": "dmp",
                "wakeup_motion_threshold": 0.5,
                "obd_retry_interval": 2000
            }"#,
        )
        .unwrap();
        assert_eq!(config.storage, StorageBackend::Spiffs);
        assert_eq!(config.mems, MemsVariant::Dmp);
        assert_eq!(config.wakeup_motion_threshold, 0.5);
        assert_eq!(config.obd_retry_interval, Duration::from_millis(2_000));
        assert!(config.motion_gated());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            Config::from_json(r#"{ "use_obd": true }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn serializes_round_trip_through_json() {
        let config = Config {
            gnss: GnssVariant::Sim5360,
            nmea_server: true,
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }
}
