//! NMEA 0183 sentences for the TCP server.
//!
//! Valid GNSS records become a `$GPRMC` and a `$GPGGA` sentence; GNSS records without a fix become a void `$GPRMC`
//! so clients can tell the receiver is alive. Other records produce nothing.

use core::fmt::{self, Write};

use chrono::{DateTime, Utc};

use crate::reading::{FixQuality, GnssFix, Payload, Record};

/// Longest sentence produced, terminator included. The NMEA limit is 82 characters.
pub const MAX_SENTENCE_LEN: usize = 96;

/// One checksummed sentence including its `\r\n` terminator.
pub type Sentence = heapless::String<MAX_SENTENCE_LEN>;

/// Sentences for `record`, in sending order.
pub fn sentences(record: &Record) -> Result<heapless::Vec<Sentence, 2>, fmt::Error> {
    let mut out = heapless::Vec::new();
    let Payload::Gnss(fix) = &record.reading.payload else {
        return Ok(out);
    };
    let utc = fix.utc_millis.or(record.reading.timestamp.wall_millis);

    if record.reading.valid && fix.quality.has_position() {
        out.push(rmc(fix, utc)?).map_err(|_| fmt::Error)?;
        out.push(gga(fix, utc)?).map_err(|_| fmt::Error)?;
    } else {
        out.push(void_rmc(utc)?).map_err(|_| fmt::Error)?;
    }
    Ok(out)
}

/// Recommended minimum data sentence.
pub fn rmc(fix: &GnssFix, utc: Option<u64>) -> Result<Sentence, fmt::Error> {
    let utc = utc.and_then(utc_time);
    let mut body = Sentence::new();
    body.write_str("$GPRMC,")?;
    write_time(&mut body, utc)?;
    body.write_str(",A,")?;
    write_coordinate(&mut body, fix.lat, 2, ['N', 'S'])?;
    body.write_char(',')?;
    write_coordinate(&mut body, fix.lon, 3, ['E', 'W'])?;
    write!(
        body,
        ",{:.1},{:.1},",
        fix.speed / KMH_PER_KNOT,
        fix.heading
    )?;
    write_date(&mut body, utc)?;
    body.write_str(",,,A")?;
    finish(body)
}

/// Fix data sentence.
pub fn gga(fix: &GnssFix, utc: Option<u64>) -> Result<Sentence, fmt::Error> {
    let quality = match fix.quality {
        FixQuality::NoFix => 0,
        FixQuality::Fix2d | FixQuality::Fix3d => 1,
        FixQuality::Differential => 2,
    };

    let mut body = Sentence::new();
    body.write_str("$GPGGA,")?;
    write_time(&mut body, utc.and_then(utc_time))?;
    body.write_char(',')?;
    write_coordinate(&mut body, fix.lat, 2, ['N', 'S'])?;
    body.write_char(',')?;
    write_coordinate(&mut body, fix.lon, 3, ['E', 'W'])?;
    write!(
        body,
        ",{quality},{:02},,{:.1},M,,M,,",
        fix.satellites, fix.alt
    )?;
    finish(body)
}

/// `$GPRMC` with status `V` (no valid position).
pub fn void_rmc(utc: Option<u64>) -> Result<Sentence, fmt::Error> {
    let utc = utc.and_then(utc_time);
    let mut body = Sentence::new();
    body.write_str("$GPRMC,")?;
    write_time(&mut body, utc)?;
    body.write_str(",V,,,,,,,")?;
    write_date(&mut body, utc)?;
    body.write_str(",,,N")?;
    finish(body)
}

/// XOR of every character between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.trim_start_matches('$')
        .bytes()
        .fold(0, |checksum, byte| checksum ^ byte)
}

const KMH_PER_KNOT: f32 = 1.852;

fn finish(mut body: Sentence) -> Result<Sentence, fmt::Error> {
    let checksum = checksum(&body);
    write!(body, "*{checksum:02X}\r\n")?;
    Ok(body)
}

/// Writes `degrees` as `(d)ddmm.mmmm,H`.
fn write_coordinate(
    out: &mut Sentence,
    degrees: f64,
    degree_digits: usize,
    hemispheres: [char; 2],
) -> fmt::Result {
    let hemisphere = if degrees < 0.0 {
        hemispheres[1]
    } else {
        hemispheres[0]
    };
    let absolute = degrees.abs();
    let mut whole = absolute.trunc() as u32;
    let mut minutes = (absolute - absolute.trunc()) * 60.0;
    // Avoid printing 60.0000 minutes after rounding.
    if minutes >= 59.999_95 {
        whole += 1;
        minutes = 0.0;
    }
    write!(
        out,
        "{whole:0degree_digits$}{minutes:07.4},{hemisphere}"
    )
}

fn write_time(out: &mut Sentence, utc: Option<DateTime<Utc>>) -> fmt::Result {
    match utc {
        Some(utc) => write!(
            out,
            "{}.{:02}",
            utc.format("%H%M%S"),
            utc.timestamp_subsec_millis() / 10
        ),
        None => Ok(()),
    }
}

fn write_date(out: &mut Sentence, utc: Option<DateTime<Utc>>) -> fmt::Result {
    match utc {
        Some(utc) => write!(out, "{}", utc.format("%d%m%y")),
        None => Ok(()),
    }
}

/// Calendar time of `millis` since the Unix epoch, if representable.
fn utc_time(millis: u64) -> Option<DateTime<Utc>> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
