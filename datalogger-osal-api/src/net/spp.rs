//! Bluetooth LE serial port profile.

use super::NetError;

/// A BLE SPP server that streams bytes to at most one connected central.
pub trait SppServer {
    /// Starts advertising under `profile`.
    fn start(&mut self, profile: &str) -> Result<(), NetError>;

    /// Returns `true` while a central is connected.
    fn is_connected(&self) -> bool;

    /// Sends `bytes` to the connected central.
    ///
    /// Returns [`NetError::NotConnected`] when nobody is connected.
    fn send(&mut self, bytes: &[u8]) -> Result<(), NetError>;
}
