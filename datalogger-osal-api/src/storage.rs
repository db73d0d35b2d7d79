//! Persistent storage medium abstraction.
//!
//! A medium stores one append-only byte log per Session. It knows nothing about readings or framing; the core hands
//! it complete frames and relies on it only to keep the bytes in order.

use core::fmt::{Display, Formatter};

/// An append-only medium such as an SD card or a SPIFFS partition.
///
/// # Example
///
/// ```
/// use datalogger_osal_api::storage::{StorageError, StorageMedium};
///
/// fn write_marker(medium: &mut impl StorageMedium) -> Result<(), StorageError> {
///     let mut handle = medium.open(1)?;
///     medium.append(&mut handle, b"marker")?;
///     medium.close(handle);
///     Ok(())
/// }
/// ```
pub trait StorageMedium {
    /// An open log on the medium.
    type Handle: core::fmt::Debug;

    /// Opens (creating if needed) the log for `session_id`, positioned for appending.
    fn open(&mut self, session_id: u32) -> Result<Self::Handle, StorageError>;

    /// Appends `bytes` to the log.
    ///
    /// An implementation may leave a prefix of `bytes` on the medium when it fails part way.
    fn append(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), StorageError>;

    /// Pushes buffered bytes to the medium.
    fn flush(&mut self, handle: &mut Self::Handle) -> Result<(), StorageError> {
        let _ = handle;
        Ok(())
    }

    /// Closes the log. Closing never fails from the caller's point of view.
    fn close(&mut self, handle: Self::Handle);
}

/// Errors reported by a [`StorageMedium`] or by the storage sink built on top of it.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash)]
pub enum StorageError {
    /// The medium has no space left.
    MediumFull,
    /// The medium is not present (card removed, partition not mounted).
    MediumAbsent,
    /// The write failed for another reason.
    WriteFailed,
    /// The sink stopped writing after repeated failures and dropped the record.
    ///
    /// Media never return this; it is reported by the sink until it is reset.
    Suspended,
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            StorageError::MediumFull => write!(f, "the storage medium is full"),
            StorageError::MediumAbsent => write!(f, "the storage medium is absent"),
            StorageError::WriteFailed => write!(f, "the write to the storage medium failed"),
            StorageError::Suspended => write!(f, "storage is suspended"),
        }
    }
}

impl core::error::Error for StorageError {}
