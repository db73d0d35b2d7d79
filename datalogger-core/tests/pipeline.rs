#![expect(missing_docs, reason = "test")]

use datalogger_core::Datalogger;
use datalogger_core::buffer::RecordBuffer;
use datalogger_core::clock::{Clock, Timestamp};
use datalogger_core::config::{Config, GnssVariant};
use datalogger_core::publish::{BleTarget, SerialTarget};
use datalogger_core::reading::{GnssFix, Payload, Reading, Record, SourceKind};
use datalogger_core::scheduler::{Scheduler, SourceState};
use datalogger_core::session::Session;
use datalogger_core::source::PollError;
use datalogger_core::storage::{MediumSink, Sink, frame};
use datalogger_core::test_helpers::{
    CapturePort, ManualTime, MemoryMedium, MockSpp, ScriptedSensor, gnss_payload, mems_payload,
    obd_payload,
};
use datalogger_osal_api::time::{Duration, Instant};
use pretty_assertions::assert_eq;

fn line_seqs(lines: &[String]) -> Vec<u64> {
    lines
        .iter()
        .filter_map(|line| line.split(',').next()?.parse().ok())
        .collect()
}

fn strictly_increasing(seqs: &[u64]) -> bool {
    seqs.windows(2).all(|pair| pair[0] < pair[1])
}

#[test]
fn log_survives_a_torn_final_write() {
    let medium = MemoryMedium::new();
    let mut sink = MediumSink::new(medium.clone(), 5);
    let mut session = Session::new(3, Timestamp::monotonic(Instant::ZERO));
    sink.open_session(3).unwrap();

    let payloads = [
        obd_payload(0x0C, 1_200),
        gnss_payload(Some(1_700_000_000_000)),
        mems_payload([0.01, -0.02, 0.98]),
    ];
    let records: Vec<Record> = (0..30u64)
        .map(|index| {
            let at = Timestamp::monotonic(Instant::from_millis(index * 100));
            let payload = payloads[index as usize % payloads.len()].clone();
            session.stamp(Reading::new(at, payload))
        })
        .collect();
    for record in &records {
        sink.append(record).unwrap();
    }

    // Power fails half way through the next frame.
    let next = session.stamp(Reading::new(
        Timestamp::monotonic(Instant::from_millis(3_000)),
        obd_payload(0x0D, 7),
    ));
    let torn = frame::encode(&next).unwrap();
    medium.append_raw(3, &torn[..torn.len() / 2]);

    let log = medium.log(3);
    let scan = frame::scan(&log);
    assert_eq!(scan.records, records);
    assert_eq!(scan.corrupt_frames, 0);
    assert_eq!(scan.trailing_bytes, torn.len() / 2);
    assert_eq!(scan.valid_len(log.len()), log.len() - torn.len() / 2);
}

#[test]
fn invalid_readings_are_published_but_not_persisted() {
    let config = Config {
        obd: false,
        gnss: GnssVariant::Standalone,
        serial_out: true,
        ..Config::default()
    };
    let time = ManualTime::new();
    let medium = MemoryMedium::new();
    let port = CapturePort::new();
    let mut logger = Datalogger::new(config, time.clone(), medium.clone()).unwrap();
    let cold_start = Reading::invalid(
        Timestamp::monotonic(Instant::ZERO),
        Payload::Gnss(GnssFix::default()),
    );
    logger
        .install_source(Box::new(
            ScriptedSensor::always(SourceKind::Gnss, gnss_payload(Some(1_700_000_000_000)))
                .then_reading(cold_start.clone())
                .then_reading(cold_start),
        ))
        .unwrap();
    logger
        .add_target(Box::new(SerialTarget::new(port.clone())))
        .unwrap();
    logger.start().unwrap();

    for _ in 0..4 {
        logger.tick();
        time.advance(Duration::from_millis(1_000));
    }
    logger.shutdown();

    let persisted = frame::scan(&medium.log(1)).records;
    let seqs: Vec<u64> = persisted.iter().map(|record| record.seq).collect();
    assert_eq!(seqs, vec![2, 3]);
    assert!(persisted.iter().all(|record| record.reading.timestamp.wall_millis.is_some()));
    assert_eq!(port.lines().len(), 4);
    assert_eq!(logger.stats().sink.skipped_invalid, 2);
}

#[test]
fn reinitializing_keeps_backoff_state() {
    let config = Config::default();
    let mut scheduler = Scheduler::new(&config);
    let obd = ScriptedSensor::always(SourceKind::Obd, obd_payload(0x0C, 700))
        .then_err(PollError::Unavailable);
    let handle = obd.handle();
    scheduler.install(&config, Box::new(obd)).unwrap();

    let mut clock = Clock::new();
    let mut session = Session::new(1, Timestamp::monotonic(Instant::ZERO));
    let mut buffer = RecordBuffer::new(16);

    scheduler.initialize(Instant::ZERO);
    scheduler.tick(Instant::ZERO, &mut clock, &mut session, &mut buffer);
    let backoff = scheduler.next_due(SourceKind::Obd);
    assert_eq!(backoff, Some(Instant::from_millis(3_000)));

    scheduler.initialize(Instant::from_millis(100));
    assert_eq!(handle.init_calls(), 1);
    assert_eq!(scheduler.next_due(SourceKind::Obd), backoff);
    assert_eq!(scheduler.state(SourceKind::Obd), Some(SourceState::Active));

    let report = scheduler.tick(Instant::from_millis(100), &mut clock, &mut session, &mut buffer);
    assert_eq!(report.polled, 0);
    assert_eq!(handle.polls(), 1);
}

#[test]
fn every_consumer_sees_records_in_sequence_order() {
    let config = Config {
        gnss: GnssVariant::Standalone,
        serial_out: true,
        ble: true,
        buffer_capacity: 6,
        storage_writes_per_tick: 2,
        publish_per_tick: 1,
        obd_poll_interval: Duration::from_millis(100),
        gnss_poll_interval: Duration::from_millis(200),
        ..Config::default()
    };
    let time = ManualTime::new();
    let medium = MemoryMedium::new();
    let port = CapturePort::new();
    let spp = MockSpp::new();
    let mut logger = Datalogger::new(config, time.clone(), medium.clone()).unwrap();
    logger
        .install_source(Box::new(ScriptedSensor::always(
            SourceKind::Obd,
            obd_payload(0x0C, 900),
        )))
        .unwrap();
    logger
        .install_source(Box::new(ScriptedSensor::always(
            SourceKind::Gnss,
            gnss_payload(None),
        )))
        .unwrap();
    logger
        .add_target(Box::new(SerialTarget::new(port.clone())))
        .unwrap();
    logger
        .add_target(Box::new(BleTarget::new(spp.clone(), "datalogger")))
        .unwrap();
    logger.start().unwrap();

    for tick in 0..120u64 {
        spp.set_connected(tick % 7 < 3);
        logger.tick();
        time.advance(Duration::from_millis(100));
    }
    logger.shutdown();

    let stats = logger.stats();
    assert!(stats.overflow > 0, "the scenario is meant to overflow");

    let persisted: Vec<u64> = frame::scan(&medium.log(1))
        .records
        .iter()
        .map(|record| record.seq)
        .collect();
    let serial = line_seqs(&port.lines());
    let ble = line_seqs(&spp.lines());
    for seqs in [&persisted, &serial, &ble] {
        assert!(!seqs.is_empty());
        assert!(strictly_increasing(seqs), "{seqs:?}");
    }

    let ble_stats = stats.target("ble").unwrap();
    assert_eq!(ble.len() as u64, ble_stats.counters.sent);
    assert!(ble_stats.missed > 0);
}
