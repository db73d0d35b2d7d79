//! Serial text output.

use super::NetError;

/// A serial port used for human-readable data output.
pub trait SerialPort {
    /// Writes `bytes`, bounded by the port's own write timeout.
    fn write(&mut self, bytes: &[u8]) -> Result<(), NetError>;
}
