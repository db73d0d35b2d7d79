//! Session logs as files in a directory.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use datalogger_osal_api::storage::{StorageError, StorageMedium};

use crate::IntoOsalError;

/// File name extension of Session logs.
pub const LOG_EXTENSION: &str = "dlog";

/// A directory holding one append-only file per Session, named `<session id>.dlog`.
///
/// The directory stands in for the mount point of an SD card or a SPIFFS partition: if it is missing, the medium is
/// reported absent.
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

/// An open Session log.
#[derive(Debug)]
pub struct FileHandle {
    session: u32,
    file: fs_err::File,
}

impl FileMedium {
    /// Creates a medium storing logs in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory logs are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log of `session_id`.
    pub fn path(&self, session_id: u32) -> PathBuf {
        self.dir.join(format!("{session_id:08}.{LOG_EXTENSION}"))
    }

    /// Ids of the Sessions with a log in the directory, in ascending order.
    pub fn sessions(&self) -> std::io::Result<Vec<u32>> {
        let mut sessions = Vec::new();
        for entry in fs_err::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|extension| extension == LOG_EXTENSION)
                && let Some(id) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse().ok())
            {
                sessions.push(id);
            }
        }
        sessions.sort_unstable();
        Ok(sessions)
    }

    /// The id following the newest log in the directory, so new Sessions never append to old logs.
    pub fn next_session_id(&self) -> std::io::Result<u32> {
        Ok(self
            .sessions()?
            .last()
            .map_or(1, |newest| newest.saturating_add(1)))
    }
}

impl StorageMedium for FileMedium {
    type Handle = FileHandle;

    fn open(&mut self, session_id: u32) -> Result<FileHandle, StorageError> {
        let file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(session_id))
            .map_err(IntoOsalError::into_osal_error)?;
        tracing::debug!(path = %file.path().display(), "log file opened");
        Ok(FileHandle {
            session: session_id,
            file,
        })
    }

    fn append(&mut self, handle: &mut FileHandle, bytes: &[u8]) -> Result<(), StorageError> {
        handle
            .file
            .write_all(bytes)
            .map_err(IntoOsalError::into_osal_error)
    }

    fn flush(&mut self, handle: &mut FileHandle) -> Result<(), StorageError> {
        handle
            .file
            .sync_data()
            .map_err(IntoOsalError::into_osal_error)
    }

    fn close(&mut self, handle: FileHandle) {
        // Closing never fails from the caller's point of view.
        if let Err(error) = handle.file.sync_all() {
            tracing::warn!(session = handle.session, %error, "log file sync failed on close");
        }
    }
}

impl IntoOsalError<StorageError> for std::io::Error {
    fn into_osal_error(self) -> StorageError {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => StorageError::MediumAbsent,
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded | ErrorKind::FileTooLarge => {
                StorageError::MediumFull
            }
            _ => StorageError::WriteFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_directory_is_an_absent_medium() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = FileMedium::new(dir.path().join("unmounted"));
        assert_eq!(medium.open(1).unwrap_err(), StorageError::MediumAbsent);
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = FileMedium::new(dir.path());

        let mut handle = medium.open(2).unwrap();
        medium.append(&mut handle, b"first ").unwrap();
        medium.close(handle);
        let mut handle = medium.open(2).unwrap();
        medium.append(&mut handle, b"second").unwrap();
        medium.flush(&mut handle).unwrap();
        medium.close(handle);

        let contents = fs_err::read(medium.path(2)).unwrap();
        assert_eq!(contents, b"first second");
    }

    #[test]
    fn sessions_are_listed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut medium = FileMedium::new(dir.path());
        assert_eq!(medium.next_session_id().unwrap(), 1);

        for id in [12, 3, 7] {
            let handle = medium.open(id).unwrap();
            medium.close(handle);
        }
        fs_err::write(dir.path().join("notes.txt"), "not a log").unwrap();

        assert_eq!(medium.sessions().unwrap(), vec![3, 7, 12]);
        assert_eq!(medium.next_session_id().unwrap(), 13);
    }

    #[test]
    fn io_errors_map_to_storage_errors() {
        let full: StorageError = std::io::Error::from(ErrorKind::StorageFull).into_osal_error();
        assert_eq!(full, StorageError::MediumFull);
        let denied: StorageError =
            std::io::Error::from(ErrorKind::PermissionDenied).into_osal_error();
        assert_eq!(denied, StorageError::WriteFailed);
    }
}
