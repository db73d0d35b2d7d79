//! Network transports for the std platform.

use std::io::ErrorKind;

use datalogger_osal_api::net::NetError;

use crate::IntoOsalError;

pub mod link;
pub mod serial;
pub mod tcp;

pub use self::link::HostLink;
pub use self::serial::{StdoutSerial, WriteSerial};
pub use self::tcp::{NmeaTcpServer, TcpClient};

impl IntoOsalError<NetError> for std::io::Error {
    fn into_osal_error(self) -> NetError {
        match self.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => NetError::WouldBlock,
            ErrorKind::NotConnected => NetError::NotConnected,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => NetError::ConnectionReset,
            ErrorKind::AddrInUse => NetError::AddressInUse,
            ErrorKind::NetworkDown | ErrorKind::NetworkUnreachable => NetError::NetworkDown,
            _ => NetError::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_reported_as_backpressure() {
        for kind in [ErrorKind::WouldBlock, ErrorKind::TimedOut] {
            let error: NetError = std::io::Error::from(kind).into_osal_error();
            assert_eq!(error, NetError::WouldBlock);
        }
        let error: NetError = std::io::Error::from(ErrorKind::BrokenPipe).into_osal_error();
        assert_eq!(error, NetError::ConnectionReset);
    }
}
