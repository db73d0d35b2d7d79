//! TCP server abstractions.
//!
//! To get started, see [`TcpServer`].

use core::net::SocketAddr;

use super::NetError;

/// A listening TCP server that hands out client connections without blocking.
///
/// # Example
///
/// ```no_run
/// use datalogger_osal_api::net::{NetError, TcpConnection, TcpServer};
///
/// fn greet_new_clients(server: &mut impl TcpServer) -> Result<(), NetError> {
///     server.listen(4000)?;
///     while let Some((mut connection, _peer)) = server.accept()? {
///         connection.send(b"hello\r\n")?;
///     }
///     Ok(())
/// }
/// ```
pub trait TcpServer {
    /// A connected client.
    type Connection: TcpConnection;

    /// Starts listening on `port` on all interfaces.
    ///
    /// Port `0` is rejected with [`NetError::InvalidPort`].
    fn listen(&mut self, port: u16) -> Result<(), NetError>;

    /// Returns a pending client connection, or `None` if nobody is waiting.
    fn accept(&mut self) -> Result<Option<(Self::Connection, SocketAddr)>, NetError>;
}

/// A connected TCP client.
pub trait TcpConnection: core::fmt::Debug {
    /// Queues `bytes` for sending.
    ///
    /// Returns [`NetError::WouldBlock`] if the client is not draining its socket fast enough, in which case none of
    /// `bytes` was queued. Once accepted, `bytes` reach the client whole and before anything sent later.
    fn send(&mut self, bytes: &[u8]) -> Result<(), NetError>;

    /// Closes the connection.
    fn close(self);
}
