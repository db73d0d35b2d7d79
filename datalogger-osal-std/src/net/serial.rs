//! Serial output on a host.

use std::io::Write;

use datalogger_osal_api::net::{NetError, SerialPort};

use crate::IntoOsalError;

/// A [`SerialPort`] writing to any [`Write`] sink, flushing after every write.
#[derive(Debug)]
pub struct WriteSerial<W> {
    writer: W,
}

/// Serial output on the process's standard output.
pub type StdoutSerial = WriteSerial<std::io::Stdout>;

impl<W: Write> WriteSerial<W> {
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl StdoutSerial {
    /// Serial output on standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> SerialPort for WriteSerial<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        self.writer
            .write_all(bytes)
            .and_then(|()| self.writer.flush())
            .map_err(IntoOsalError::into_osal_error)
    }
}
