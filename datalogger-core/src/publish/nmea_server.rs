use core::net::SocketAddr;

use datalogger_osal_api::net::{NetError, NetworkLink, TcpConnection, TcpServer};
use datalogger_osal_api::time::{Duration, Instant};

use super::{PublishTarget, nmea};
use crate::config::Config;
use crate::reading::Record;

/// Connection state of the NMEA server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not associated; the next service call starts a join.
    Idle,
    /// Waiting for the network association.
    Joining {
        /// When the join started.
        since: Instant,
    },
    /// Associated and accepting clients.
    Listening,
    /// A join or listen failed; waiting before the next attempt.
    Backoff {
        /// When the next attempt starts.
        until: Instant,
    },
}

#[derive(Debug)]
struct Client<C> {
    connection: C,
    peer: SocketAddr,
}

/// Serves GNSS records as NMEA sentences to TCP clients.
///
/// The server joins the network first and gives up on a join after the configured timeout, retrying after the same
/// delay. Once listening it accepts up to the configured number of clients; extra clients are closed right away. A
/// client whose send fails is dropped without affecting the others. Records published while nobody is connected are
/// discarded so a new client starts with live data.
#[derive(Debug)]
pub struct NmeaServerTarget<L, S: TcpServer> {
    link: L,
    server: S,
    port: u16,
    join_timeout: Duration,
    max_clients: usize,
    state: ServerState,
    clients: Vec<Client<S::Connection>>,
}

impl<L: NetworkLink, S: TcpServer> NmeaServerTarget<L, S> {
    /// Creates a server on `port` over `link`.
    pub fn new(
        link: L,
        server: S,
        port: u16,
        join_timeout: Duration,
        max_clients: usize,
    ) -> Self {
        Self {
            link,
            server,
            port,
            join_timeout,
            max_clients,
            state: ServerState::Idle,
            clients: Vec::new(),
        }
    }

    /// Creates a server with the port, join timeout and client limit of `config`.
    pub fn from_config(link: L, server: S, config: &Config) -> Self {
        Self::new(
            link,
            server,
            config.nmea_tcp_port,
            config.wifi_join_timeout,
            config.nmea_max_clients,
        )
    }

    /// Current connection state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn back_off(&mut self, now: Instant) {
        self.link.leave();
        self.state = ServerState::Backoff {
            until: now + self.join_timeout,
        };
    }

    fn drop_all_clients(&mut self) {
        for client in self.clients.drain(..) {
            tracing::debug!(peer = %client.peer, "closing NMEA client");
            client.connection.close();
        }
    }

    fn accept_clients(&mut self) {
        loop {
            match self.server.accept() {
                Ok(Some((connection, peer))) => {
                    if self.clients.len() >= self.max_clients {
                        tracing::info!(%peer, limit = self.max_clients, "NMEA client rejected");
                        connection.close();
                        continue;
                    }
                    tracing::info!(%peer, "NMEA client connected");
                    self.clients.push(Client { connection, peer });
                }
                Ok(None) | Err(NetError::WouldBlock) => break,
                Err(error) => {
                    tracing::warn!(%error, "accepting NMEA client failed");
                    break;
                }
            }
        }
    }
}

impl<L, S> PublishTarget for NmeaServerTarget<L, S>
where
    L: NetworkLink + core::fmt::Debug,
    S: TcpServer + core::fmt::Debug,
{
    fn name(&self) -> &'static str {
        "nmea"
    }

    fn service(&mut self, now: Instant) {
        match self.state {
            ServerState::Idle => match self.link.begin_join() {
                Ok(()) => {
                    tracing::debug!("joining network");
                    self.state = ServerState::Joining { since: now };
                }
                Err(error) => {
                    tracing::warn!(%error, "network join failed to start");
                    self.back_off(now);
                }
            },
            ServerState::Joining { since } => {
                if self.link.is_joined() {
                    match self.server.listen(self.port) {
                        Ok(()) => {
                            tracing::info!(port = self.port, "NMEA server listening");
                            self.state = ServerState::Listening;
                        }
                        Err(error) => {
                            tracing::warn!(%error, port = self.port, "NMEA server failed to listen");
                            self.back_off(now);
                        }
                    }
                } else if now.saturating_duration_since(since) >= self.join_timeout {
                    tracing::warn!(timeout = %self.join_timeout, "network join timed out");
                    self.back_off(now);
                }
            }
            ServerState::Listening => {
                if !self.link.is_joined() {
                    tracing::warn!("network association lost");
                    self.drop_all_clients();
                    self.state = ServerState::Idle;
                    return;
                }
                self.accept_clients();
            }
            ServerState::Backoff { until } => {
                if now >= until {
                    self.state = ServerState::Idle;
                }
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.state == ServerState::Listening
    }

    fn publish(&mut self, record: &Record) -> Result<(), NetError> {
        if self.clients.is_empty() {
            return Ok(());
        }
        let sentences = nmea::sentences(record).map_err(|_| NetError::Other)?;

        let mut index = 0;
        while index < self.clients.len() {
            let client = &mut self.clients[index];
            let mut failed = None;
            for sentence in &sentences {
                match client.connection.send(sentence.as_bytes()) {
                    Ok(()) => {}
                    Err(NetError::WouldBlock) => {
                        tracing::trace!(peer = %client.peer, "NMEA client is slow, sentence skipped");
                    }
                    Err(error) => {
                        failed = Some(error);
                        break;
                    }
                }
            }

            match failed {
                Some(error) => {
                    let client = self.clients.swap_remove(index);
                    tracing::info!(peer = %client.peer, %error, "NMEA client dropped");
                    client.connection.close();
                }
                None => index += 1,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use datalogger_osal_api::time::Instant;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::Timestamp;
    use crate::reading::{FixQuality, GnssFix, MemsData, Payload, Reading};
    use crate::test_helpers::{MockLink, MockTcpServer};

    fn at(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    fn fix_record(seq: u64) -> Record {
        let fix = GnssFix {
            lat: 1.5,
            lon: 2.5,
            quality: FixQuality::Fix3d,
            satellites: 5,
            utc_millis: Some(1_000),
            ..GnssFix::default()
        };
        Record {
            session: 1,
            seq,
            reading: Reading::new(Timestamp::monotonic(at(seq)), Payload::Gnss(fix)),
        }
    }

    fn target(
        link: &MockLink,
        server: &MockTcpServer,
        max_clients: usize,
    ) -> NmeaServerTarget<MockLink, MockTcpServer> {
        NmeaServerTarget::new(
            link.clone(),
            server.clone(),
            4000,
            Duration::from_millis(30_000),
            max_clients,
        )
    }

    #[test]
    fn join_timeout_backs_off_and_retries() {
        let link = MockLink::new();
        let server = MockTcpServer::new();
        let mut target = target(&link, &server, 4);

        target.service(at(0));
        assert_eq!(target.state(), ServerState::Joining { since: at(0) });
        target.service(at(29_999));
        assert!(matches!(target.state(), ServerState::Joining { .. }));
        target.service(at(30_000));
        assert_eq!(
            target.state(),
            ServerState::Backoff { until: at(60_000) }
        );
        assert_eq!(link.leave_calls(), 1);
        assert!(!target.is_ready());

        target.service(at(60_000));
        link.set_joined(true);
        target.service(at(60_100));
        target.service(at(60_200));
        assert_eq!(target.state(), ServerState::Listening);
        assert_eq!(server.listening_on(), Some(4000));
        assert_eq!(link.begin_calls(), 2);
    }

    #[test]
    fn client_limit_is_enforced() {
        let link = MockLink::joined();
        let server = MockTcpServer::new();
        let mut target = target(&link, &server, 2);
        target.service(at(0));
        target.service(at(1));

        let clients: Vec<_> = (0..3).map(|_| server.connect()).collect();
        target.service(at(2));

        assert_eq!(target.client_count(), 2);
        assert!(!clients[0].is_closed());
        assert!(!clients[1].is_closed());
        assert!(clients[2].is_closed());
    }

    #[test]
    fn failing_client_is_dropped_alone() {
        let link = MockLink::joined();
        let server = MockTcpServer::new();
        let mut target = target(&link, &server, 4);
        target.service(at(0));
        target.service(at(1));
        let healthy = server.connect();
        let broken = server.connect();
        target.service(at(2));

        broken.fail_with(Some(NetError::ConnectionReset));
        target.publish(&fix_record(0)).unwrap();
        target.publish(&fix_record(1)).unwrap();

        assert_eq!(target.client_count(), 1);
        assert!(broken.is_closed());
        let received = healthy.received();
        assert_eq!(received.matches("$GPRMC").count(), 2);
        assert_eq!(received.matches("$GPGGA").count(), 2);
    }

    #[test]
    fn non_gnss_records_send_nothing() {
        let link = MockLink::joined();
        let server = MockTcpServer::new();
        let mut target = target(&link, &server, 4);
        target.service(at(0));
        target.service(at(1));
        let client = server.connect();
        target.service(at(2));

        let record = Record {
            session: 1,
            seq: 0,
            reading: Reading::new(
                Timestamp::monotonic(at(0)),
                Payload::Mems(MemsData::default()),
            ),
        };
        target.publish(&record).unwrap();
        assert_eq!(client.received(), "");
    }

    #[test]
    fn losing_the_network_drops_clients() {
        let link = MockLink::joined();
        let server = MockTcpServer::new();
        let mut target = target(&link, &server, 4);
        target.service(at(0));
        target.service(at(1));
        let client = server.connect();
        target.service(at(2));

        link.set_joined(false);
        target.service(at(3));

        assert_eq!(target.state(), ServerState::Idle);
        assert_eq!(target.client_count(), 0);
        assert!(client.is_closed());
    }
}
