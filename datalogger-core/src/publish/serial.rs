use datalogger_osal_api::net::{NetError, SerialPort};

use super::{PublishTarget, text};
use crate::reading::Record;

/// Echoes records as text lines on a serial port.
#[derive(Debug)]
pub struct SerialTarget<P> {
    port: P,
}

impl<P: SerialPort> SerialTarget<P> {
    /// Creates a target writing to `port`.
    pub fn new(port: P) -> Self {
        Self { port }
    }
}

impl<P: SerialPort + core::fmt::Debug> PublishTarget for SerialTarget<P> {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn publish(&mut self, record: &Record) -> Result<(), NetError> {
        self.port.write(text::format_line(record).as_bytes())
    }
}
