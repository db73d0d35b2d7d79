#![expect(missing_docs, reason = "test")]

use std::io::{BufRead, BufReader, Read};
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};

use datalogger_core::Datalogger;
use datalogger_core::clock::Timestamp;
use datalogger_core::config::Config;
use datalogger_core::publish::{NmeaServerTarget, PublishTarget, ServerState};
use datalogger_core::reading::{FixQuality, GnssFix, Payload, Reading, Record, SourceKind};
use datalogger_core::storage::frame;
use datalogger_core::test_helpers::{ManualTime, ScriptedSensor, obd_payload};
use datalogger_osal_api::net::{NetError, TcpConnection, TcpServer};
use datalogger_osal_api::time::{Duration, Instant};
use datalogger_osal_std::net::{HostLink, NmeaTcpServer};
use datalogger_osal_std::storage::FileMedium;
use pretty_assertions::assert_eq;

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn logs_land_in_session_files() {
    let dir = tempfile::tempdir().unwrap();
    let medium = FileMedium::new(dir.path());
    let base = medium.next_session_id().unwrap();
    let time = ManualTime::new();

    let mut logger = Datalogger::new(Config::default(), time.clone(), medium.clone())
        .unwrap()
        .with_session_base(base);
    logger
        .install_source(Box::new(ScriptedSensor::always(
            SourceKind::Obd,
            obd_payload(0x05, 88),
        )))
        .unwrap();
    logger.start().unwrap();
    for _ in 0..5 {
        logger.tick();
        time.advance(Duration::from_millis(500));
    }
    logger.shutdown();

    assert_eq!(medium.sessions().unwrap(), vec![1]);
    let log = fs_err::read(medium.path(1)).unwrap();
    let scan = frame::scan(&log);
    assert_eq!(scan.records.len(), 5);
    assert_eq!(scan.trailing_bytes, 0);
    assert_eq!(medium.next_session_id().unwrap(), 2);
}

#[test]
fn nmea_clients_receive_sentences() {
    let port = free_port();
    let mut target = NmeaServerTarget::new(
        HostLink::new(),
        NmeaTcpServer::on(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        port,
        Duration::from_secs(30),
        2,
    );
    target.service(Instant::from_millis(0));
    target.service(Instant::from_millis(1));
    assert_eq!(target.state(), ServerState::Listening);

    let client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    client
        .set_read_timeout(Some(std::time::Duration::from_secs(5)))
        .unwrap();
    for millis in 2..200 {
        target.service(Instant::from_millis(millis));
        if target.client_count() == 1 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(target.client_count(), 1);

    let fix = GnssFix {
        lat: 48.137,
        lon: 11.575,
        quality: FixQuality::Fix3d,
        satellites: 7,
        utc_millis: Some(1_700_000_000_000),
        ..GnssFix::default()
    };
    let record = Record {
        session: 1,
        seq: 0,
        reading: Reading::new(Timestamp::monotonic(Instant::ZERO), Payload::Gnss(fix)),
    };
    target.publish(&record).unwrap();

    let mut lines = BufReader::new(client).lines();
    let rmc = lines.next().unwrap().unwrap();
    let gga = lines.next().unwrap().unwrap();
    assert!(rmc.starts_with("$GPRMC,221320.00,A,4808.2200,N,01134.5000,E,"), "{rmc}");
    assert!(gga.starts_with("$GPGGA,221320.00,4808.2200,N,01134.5000,E,1,07,"), "{gga}");
}

#[test]
fn slow_clients_only_see_whole_sentences() {
    let mut server = NmeaTcpServer::on(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let port = free_port();
    server.listen(port).unwrap();
    let mut client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    let mut connection = loop {
        if let Some((connection, _)) = server.accept().unwrap() {
            break connection;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    };

    let mut sentence = vec![b'$'];
    sentence.resize(1_022, b'A');
    sentence.extend_from_slice(b"\r\n");

    // The client does not read until the socket buffers are full.
    let mut accepted = 0;
    let mut blocked = 0;
    while blocked < 4 {
        match connection.send(&sentence) {
            Ok(()) => accepted += 1,
            Err(NetError::WouldBlock) => blocked += 1,
            Err(error) => panic!("send failed: {error}"),
        }
    }

    let reader = std::thread::spawn(move || {
        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();
        received
    });
    loop {
        match connection.send(&[]) {
            Ok(()) => break,
            Err(NetError::WouldBlock) => std::thread::sleep(std::time::Duration::from_millis(1)),
            Err(error) => panic!("flush failed: {error}"),
        }
    }
    connection.close();

    let received = reader.join().unwrap();
    assert_eq!(received.len(), accepted * sentence.len());
    assert!(received.chunks(sentence.len()).all(|line| line == sentence));
}
