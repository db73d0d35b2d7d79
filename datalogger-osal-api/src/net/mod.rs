//! Network abstraction layer for the republishing transports.
//!
//! Every operation is non-blocking or bounded by a timeout owned by the implementation: a transport that cannot
//! accept bytes right now reports [`NetError::WouldBlock`] instead of waiting.

use core::fmt::{Display, Formatter};

pub mod serial;
pub mod spp;
pub mod tcp;
pub mod wifi;

pub use self::serial::SerialPort;
pub use self::spp::SppServer;
pub use self::tcp::{TcpConnection, TcpServer};
pub use self::wifi::NetworkLink;

/// Errors that can occur when using a transport.
///
/// Errors are scoped to one connection: a failing client is dropped, other clients and the rest of the system keep
/// running.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash)]
pub enum NetError {
    /// The transport cannot take more data right now.
    WouldBlock,
    /// No peer is connected.
    NotConnected,
    /// The connection was reset or closed by the peer.
    ConnectionReset,
    /// The operation timed out.
    TimedOut,
    /// The provided port is invalid.
    InvalidPort,
    /// The address is already in use.
    AddressInUse,
    /// The network stack or radio is down.
    NetworkDown,
    /// Currently unhandled error occurred.
    Other,
}

impl Display for NetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            NetError::WouldBlock => write!(f, "The transport cannot accept data right now."),
            NetError::NotConnected => write!(f, "No peer is connected."),
            NetError::ConnectionReset => write!(f, "The connection was reset by the peer."),
            NetError::TimedOut => write!(f, "The operation timed out."),
            NetError::InvalidPort => write!(f, "The provided port is invalid."),
            NetError::AddressInUse => write!(f, "The address is already in use."),
            NetError::NetworkDown => write!(f, "The network stack is down."),
            NetError::Other => write!(f, "Unspecified network error."),
        }
    }
}

impl core::error::Error for NetError {}
