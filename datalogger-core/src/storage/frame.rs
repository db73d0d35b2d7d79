//! Self-delimiting frames for the persisted log.
//!
//! Every record is written as one frame:
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────┬──────────────────────────┐
//! │ magic "DL"   │ len: u32 LE  │ crc32: u32 LE │ postcard(Record) [len]   │
//! └──────────────┴──────────────┴───────────────┴──────────────────────────┘
//! ```
//!
//! A log is read by scanning from offset 0. Power loss during a write can leave at most one torn frame at the end of
//! the log; the scan reports its size as trailing bytes and stops without touching the frames before it. A damaged
//! region in the middle of a log is counted and skipped by resynchronising on the next complete frame.

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::reading::Record;

/// Marks the start of every frame.
pub const FRAME_MAGIC: [u8; 2] = *b"DL";

/// Bytes before the payload: magic, length and checksum.
pub const HEADER_LEN: usize = 2 + 4 + 4;

/// Largest payload accepted; anything longer is treated as a damaged header.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024;

/// CRC-32/ISO-HDLC, the checksum used by Ethernet and ZIP.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Errors while encoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The record could not be serialized.
    #[error("failed to serialize record")]
    Encode(#[source] postcard::Error),

    /// The serialized record exceeds [`MAX_PAYLOAD_LEN`].
    #[error("serialized record is {0} bytes, more than the {MAX_PAYLOAD_LEN} byte frame limit")]
    TooLarge(usize),
}

/// Serializes `record` into a complete frame.
pub fn encode(record: &Record) -> Result<Vec<u8>, FrameError> {
    let payload = postcard::to_allocvec(record).map_err(FrameError::Encode)?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let len = payload.len() as u32;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&CRC32.checksum(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Result of scanning a complete log.
#[derive(Debug, Default)]
pub struct Scan {
    /// Records in log order.
    pub records: Vec<Record>,
    /// Damaged frames skipped before the end of the log.
    pub corrupt_frames: usize,
    /// Size of the torn frame at the end of the log, if any.
    pub trailing_bytes: usize,
}

impl Scan {
    /// Length of the log without its torn trailing frame.
    pub fn valid_len(&self, log_len: usize) -> usize {
        log_len - self.trailing_bytes
    }
}

/// Scans `log` from offset 0.
///
/// # Examples
///
/// ```
/// use datalogger_core::clock::Timestamp;
/// use datalogger_core::reading::{MemsData, Payload, Reading, Record};
/// use datalogger_core::storage::frame;
/// use datalogger_osal_api::time::Instant;
///
/// let record = Record {
///     session: 1,
///     seq: 0,
///     reading: Reading::new(Timestamp::monotonic(Instant::ZERO), Payload::Mems(MemsData::default())),
/// };
/// let mut log = frame::encode(&record)?;
/// let torn = frame::encode(&record)?;
/// log.extend_from_slice(&torn[..5]);
///
/// let scan = frame::scan(&log);
/// assert_eq!(scan.records, vec![record]);
/// assert_eq!(scan.trailing_bytes, 5);
/// # Ok::<(), frame::FrameError>(())
/// ```
pub fn scan(log: &[u8]) -> Scan {
    let mut reader = FrameReader::new(log);
    let records = reader.by_ref().map(|(_, record)| record).collect();
    Scan {
        records,
        corrupt_frames: reader.corrupt_frames(),
        trailing_bytes: reader.trailing_bytes(),
    }
}

/// Iterates over the records of a log together with their frame offsets.
#[derive(Debug)]
pub struct FrameReader<'a> {
    log: &'a [u8],
    offset: usize,
    corrupt_frames: usize,
    trailing_bytes: usize,
}

impl<'a> FrameReader<'a> {
    /// Creates a reader positioned at offset 0.
    pub fn new(log: &'a [u8]) -> Self {
        Self {
            log,
            offset: 0,
            corrupt_frames: 0,
            trailing_bytes: 0,
        }
    }

    /// Damaged regions skipped so far.
    pub fn corrupt_frames(&self) -> usize {
        self.corrupt_frames
    }

    /// Size of the torn trailing frame; only meaningful once the iterator is exhausted.
    pub fn trailing_bytes(&self) -> usize {
        self.trailing_bytes
    }

    /// The checksummed payload of the frame starting at `offset`, if a complete one starts there.
    fn payload_at(&self, offset: usize) -> Option<&'a [u8]> {
        let log = self.log;
        let header = log.get(offset..offset.checked_add(HEADER_LEN)?)?;
        if header[..2] != FRAME_MAGIC {
            return None;
        }
        let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
        if len > MAX_PAYLOAD_LEN {
            return None;
        }
        let crc = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let start = offset + HEADER_LEN;
        let payload = log.get(start..start + len)?;
        (CRC32.checksum(payload) == crc).then_some(payload)
    }

    /// Offset of the next complete frame after `offset`.
    fn next_frame_after(&self, offset: usize) -> Option<usize> {
        let from = offset + 1;
        self.log
            .get(from..)?
            .windows(FRAME_MAGIC.len())
            .enumerate()
            .filter(|(_, window)| *window == FRAME_MAGIC)
            .map(|(position, _)| from + position)
            .find(|&candidate| self.payload_at(candidate).is_some())
    }
}

impl Iterator for FrameReader<'_> {
    type Item = (usize, Record);

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.log.len() {
            let offset = self.offset;
            if let Some(payload) = self.payload_at(offset) {
                match postcard::from_bytes::<Record>(payload) {
                    Ok(record) => {
                        self.offset += HEADER_LEN + payload.len();
                        return Some((offset, record));
                    }
                    Err(error) => {
                        tracing::debug!(offset, %error, "frame payload does not decode");
                    }
                }
            }

            // Anything up to the next complete frame is damage; with no complete frame left it is a torn write.
            match self.next_frame_after(offset) {
                Some(next) => {
                    tracing::debug!(offset, bytes = next - offset, "skipping damaged frame");
                    self.corrupt_frames += 1;
                    self.offset = next;
                }
                None => {
                    self.trailing_bytes = self.log.len() - offset;
                    tracing::debug!(
                        offset,
                        bytes = self.trailing_bytes,
                        "ignoring incomplete trailing frame"
                    );
                    self.offset = self.log.len();
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use datalogger_osal_api::time::Instant;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::Timestamp;
    use crate::reading::{
        FixQuality, GnssFix, MemsData, ObdData, Orientation, Payload, PidValue, Reading,
    };

    fn records() -> Vec<Record> {
        let at = |millis| Timestamp {
            tick: Instant::from_millis(millis),
            wall_millis: Some(1_700_000_000_000 + millis),
        };
        vec![
            Record {
                session: 3,
                seq: 0,
                reading: Reading::new(
                    at(10),
                    Payload::Obd(ObdData {
                        values: vec![
                            PidValue { pid: 0x0C, value: 2150 },
                            PidValue { pid: 0x0D, value: 62 },
                        ],
                    }),
                ),
            },
            Record {
                session: 3,
                seq: 1,
                reading: Reading::new(
                    at(20),
                    Payload::Gnss(GnssFix {
                        lat: -33.865143,
                        lon: 151.209900,
                        alt: 39.5,
                        speed: 48.2,
                        heading: 271.0,
                        quality: FixQuality::Fix3d,
                        satellites: 9,
                        utc_millis: Some(1_700_000_000_020),
                    }),
                ),
            },
            Record {
                session: 3,
                seq: 2,
                reading: Reading::new(
                    at(30),
                    Payload::Mems(MemsData {
                        accel: [0.01, -0.02, 0.98],
                        gyro: [1.5, 0.0, -3.25],
                        orientation: Some(Orientation {
                            yaw: 12.0,
                            pitch: -1.0,
                            roll: 0.5,
                        }),
                    }),
                ),
            },
        ]
    }

    fn log_of(records: &[Record]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|record| encode(record).unwrap())
            .collect()
    }

    #[test]
    fn scan_returns_every_record_with_its_fields() {
        let records = records();
        let scan = scan(&log_of(&records));
        assert_eq!(scan.records, records);
        assert_eq!(scan.corrupt_frames, 0);
        assert_eq!(scan.trailing_bytes, 0);
    }

    #[test]
    fn every_truncation_point_keeps_the_complete_prefix() {
        let records = records();
        let frames: Vec<Vec<u8>> = records.iter().map(|r| encode(r).unwrap()).collect();
        let log: Vec<u8> = frames.concat();
        let last_start = log.len() - frames[2].len();

        for cut in last_start..log.len() {
            let scan = scan(&log[..cut]);
            assert_eq!(scan.records, records[..2], "cut at {cut}");
            assert_eq!(scan.trailing_bytes, cut - last_start, "cut at {cut}");
            assert_eq!(scan.corrupt_frames, 0);
            assert_eq!(scan.valid_len(cut), last_start);
        }
    }

    #[test]
    fn torn_payload_at_end_is_trailing_not_corrupt() {
        let records = records();
        let mut log = log_of(&records);
        // Header and length fully written, payload bytes garbage: the write was interrupted.
        let last = log.len() - 1;
        log[last] ^= 0xFF;

        let scan = scan(&log);
        assert_eq!(scan.records, records[..2]);
        assert_eq!(scan.corrupt_frames, 0);
        assert!(scan.trailing_bytes > 0);
    }

    #[test]
    fn damaged_frame_in_the_middle_is_skipped() {
        let records = records();
        let first_len = encode(&records[0]).unwrap().len();
        let mut log = log_of(&records);
        log[first_len + HEADER_LEN + 1] ^= 0x55;

        let scan = scan(&log);
        assert_eq!(scan.records, vec![records[0].clone(), records[2].clone()]);
        assert_eq!(scan.corrupt_frames, 1);
        assert_eq!(scan.trailing_bytes, 0);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let records = records();
        let mut log = vec![0xFF, 0x00, 0x13];
        log.extend(log_of(&records));

        let scan = scan(&log);
        assert_eq!(scan.records, records);
        assert_eq!(scan.corrupt_frames, 1);
    }

    #[test]
    fn reader_reports_frame_offsets() {
        let records = records();
        let log = log_of(&records);
        let offsets: Vec<usize> = FrameReader::new(&log).map(|(offset, _)| offset).collect();
        let first = encode(&records[0]).unwrap().len();
        let second = encode(&records[1]).unwrap().len();
        assert_eq!(offsets, vec![0, first, first + second]);
    }

    #[test]
    fn empty_log_scans_clean() {
        let scan = scan(&[]);
        assert!(scan.records.is_empty());
        assert_eq!(scan.trailing_bytes, 0);
    }
}
