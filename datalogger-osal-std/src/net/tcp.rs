//! TCP server implementation for the std platform.

use std::io::{ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};

use datalogger_osal_api::net::{NetError, TcpConnection, TcpServer};
use datalogger_osal_api::time::Duration;
use socket2::{Domain, Protocol, Socket, Type};

use crate::IntoOsalError;

/// How long a send may block on a client that does not drain its socket.
const SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// Pending connections the kernel queues for the listener.
const BACKLOG: i32 = 8;

/// A non-blocking TCP listener.
///
/// [`accept`](TcpServer::accept) never waits. Accepted clients get a bounded send timeout, after which the send is
/// reported as [`NetError::WouldBlock`]. A send cut short by the timeout keeps its unsent tail and finishes it before
/// any later bytes, so clients only ever see whole sentences.
#[derive(Debug)]
pub struct NmeaTcpServer {
    address: IpAddr,
    listener: Option<TcpListener>,
}

impl Default for NmeaTcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaTcpServer {
    /// Creates a server that will listen on all IPv4 interfaces.
    pub fn new() -> Self {
        Self::on(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// Creates a server that will listen on `address` only.
    pub fn on(address: IpAddr) -> Self {
        Self {
            address,
            listener: None,
        }
    }

    /// The address the server listens on, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    fn bind(&self, port: u16) -> std::io::Result<TcpListener> {
        let address = SocketAddr::new(self.address, port);
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        // Restarting the server must not wait for old connections to leave TIME_WAIT.
        socket.set_reuse_address(true)?;
        socket.bind(&address.into())?;
        socket.listen(BACKLOG)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }
}

impl TcpServer for NmeaTcpServer {
    type Connection = TcpClient;

    fn listen(&mut self, port: u16) -> Result<(), NetError> {
        // Required to match the trait contract.
        if port == 0 {
            return Err(NetError::InvalidPort);
        }
        let listener = self.bind(port).map_err(IntoOsalError::into_osal_error)?;
        tracing::debug!(address = %self.address, port, "TCP listener bound");
        self.listener = Some(listener);
        Ok(())
    }

    fn accept(&mut self) -> Result<Option<(TcpClient, SocketAddr)>, NetError> {
        let Some(listener) = &self.listener else {
            return Err(NetError::NotConnected);
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                let client = TcpClient::new(stream).map_err(IntoOsalError::into_osal_error)?;
                Ok(Some((client, peer)))
            }
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error.into_osal_error()),
        }
    }
}

/// An accepted TCP client.
#[derive(Debug)]
pub struct TcpClient {
    stream: TcpStream,
    /// Tail of a partly written send.
    pending: Vec<u8>,
}

impl TcpClient {
    fn new(stream: TcpStream) -> std::io::Result<Self> {
        // Accepted sockets may inherit the listener's non-blocking mode; sends use a timeout instead.
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(SEND_TIMEOUT.into()))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            pending: Vec::new(),
        })
    }
}

impl TcpConnection for TcpClient {
    fn send(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        if !self.pending.is_empty() {
            let written = write_until_blocked(&mut self.stream, &self.pending)?;
            self.pending.drain(..written);
            if !self.pending.is_empty() {
                return Err(NetError::WouldBlock);
            }
        }

        let written = write_until_blocked(&mut self.stream, bytes)?;
        if written == 0 && !bytes.is_empty() {
            return Err(NetError::WouldBlock);
        }
        self.pending.extend_from_slice(&bytes[written..]);
        Ok(())
    }

    fn close(self) {
        // Any error isn't actionable here.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Writes `bytes` until done or the send timeout hits, returning how many were written.
fn write_until_blocked(stream: &mut TcpStream, bytes: &[u8]) -> Result<usize, NetError> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => return Err(NetError::ConnectionReset),
            Ok(count) => written += count,
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => {
                let error: NetError = error.into_osal_error();
                if error == NetError::WouldBlock {
                    break;
                }
                return Err(error);
            }
        }
    }
    Ok(written)
}
