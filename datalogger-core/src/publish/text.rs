//! Human-readable record lines for the serial and BLE outputs.
//!
//! One line per record: `<seq>,<tick_ms>,<SOURCE>,<fields>\r\n`.
//!
//! | Source | Fields |
//! |--------|--------|
//! | OBD    | `<PID hex>=<value>` pairs separated by `;` |
//! | GNSS   | `lat,lon,alt,speed,heading,quality,satellites` |
//! | MEMS   | `ax,ay,az,gx,gy,gz` followed by `yaw,pitch,roll` when present |
//!
//! Invalid readings carry a single `-` as their fields.

use core::fmt::{self, Write};

use crate::reading::{FixQuality, Payload, Record};

/// Formats `record` as one `\r\n` terminated line.
///
/// # Examples
///
/// ```
/// use datalogger_core::clock::Timestamp;
/// use datalogger_core::publish::text;
/// use datalogger_core::reading::{ObdData, Payload, PidValue, Reading, Record};
/// use datalogger_osal_api::time::Instant;
///
/// let record = Record {
///     session: 1,
///     seq: 42,
///     reading: Reading::new(
///         Timestamp::monotonic(Instant::from_millis(1_500)),
///         Payload::Obd(ObdData {
///             values: vec![PidValue { pid: 0x0C, value: 2150 }, PidValue { pid: 0x0D, value: 62 }],
///         }),
///     ),
/// };
/// assert_eq!(text::format_line(&record), "42,1500,OBD,0C=2150;0D=62\r\n");
/// ```
pub fn format_line(record: &Record) -> String {
    let mut line = String::with_capacity(96);
    // Writing to a `String` cannot fail.
    let _ = write_line(&mut line, record);
    line
}

fn write_line(out: &mut String, record: &Record) -> fmt::Result {
    let reading = &record.reading;
    write!(
        out,
        "{},{},{},",
        record.seq,
        reading.timestamp.tick.as_millis(),
        reading.source()
    )?;

    if !reading.valid {
        out.push('-');
    } else {
        match &reading.payload {
            Payload::Obd(data) => {
                for (index, value) in data.values.iter().enumerate() {
                    if index > 0 {
                        out.push(';');
                    }
                    write!(out, "{:02X}={}", value.pid, value.value)?;
                }
            }
            Payload::Gnss(fix) => write!(
                out,
                "{:.6},{:.6},{:.1},{:.1},{:.1},{},{}",
                fix.lat,
                fix.lon,
                fix.alt,
                fix.speed,
                fix.heading,
                quality_tag(fix.quality),
                fix.satellites
            )?,
            Payload::Mems(sample) => {
                let [ax, ay, az] = sample.accel;
                let [gx, gy, gz] = sample.gyro;
                write!(out, "{ax:.3},{ay:.3},{az:.3},{gx:.3},{gy:.3},{gz:.3}")?;
                if let Some(orientation) = sample.orientation {
                    write!(
                        out,
                        ",{:.1},{:.1},{:.1}",
                        orientation.yaw, orientation.pitch, orientation.roll
                    )?;
                }
            }
        }
    }
    out.push_str("\r\n");
    Ok(())
}

fn quality_tag(quality: FixQuality) -> &'static str {
    match quality {
        FixQuality::NoFix => "none",
        FixQuality::Fix2d => "2d",
        FixQuality::Fix3d => "3d",
        FixQuality::Differential => "dgps",
    }
}
