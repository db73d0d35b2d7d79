//! Scriptable stand-ins for the platform and the sensor drivers.
//!
//! Every helper is a cheap handle to shared state: keep a clone, move the other into the code under test, and
//! inspect or re-script through the clone.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;

use datalogger_osal_api::net::{NetError, NetworkLink, SerialPort, SppServer, TcpConnection, TcpServer};
use datalogger_osal_api::storage::{StorageError, StorageMedium};
use datalogger_osal_api::time::{Duration, Instant, TimeAbstraction};

use crate::clock::Timestamp;
use crate::reading::{FixQuality, GnssFix, MemsData, ObdData, Payload, PidValue, Reading, SourceKind};
use crate::source::{InitError, PollError, SensorCapability};

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualTime(Rc<Cell<Instant>>);

impl ManualTime {
    /// Starts at [`Instant::ZERO`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.0.set(self.0.get() + duration);
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: Instant) {
        self.0.set(instant);
    }
}

impl TimeAbstraction for ManualTime {
    fn now(&self) -> Instant {
        self.0.get()
    }
}

/// An OBD payload with a single PID.
pub fn obd_payload(pid: u16, value: i32) -> Payload {
    Payload::Obd(ObdData {
        values: vec![PidValue { pid, value }],
    })
}

/// A MEMS payload with the given acceleration.
pub fn mems_payload(accel: [f32; 3]) -> Payload {
    Payload::Mems(MemsData {
        accel,
        ..MemsData::default()
    })
}

/// A 3D GNSS fix payload.
pub fn gnss_payload(utc_millis: Option<u64>) -> Payload {
    Payload::Gnss(GnssFix {
        lat: 52.52,
        lon: 13.405,
        alt: 34.0,
        speed: 50.0,
        heading: 90.0,
        quality: FixQuality::Fix3d,
        satellites: 9,
        utc_millis,
    })
}

#[derive(Debug, Clone)]
enum Step {
    Reading { payload: Payload, valid: bool },
    Error(PollError),
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    fallback: Option<Payload>,
    fail_init: bool,
    init_calls: usize,
    polls: usize,
    timeouts: Vec<Duration>,
}

/// A sensor source that replays a script of poll results.
///
/// Once the script is exhausted, polls return the fallback payload if one was given and
/// [`PollError::Unavailable`] otherwise.
#[derive(Debug)]
pub struct ScriptedSensor {
    kind: SourceKind,
    script: Rc<RefCell<Script>>,
}

/// Inspects and extends the script of a [`ScriptedSensor`] after it was handed over.
#[derive(Debug, Clone)]
pub struct ScriptedHandle(Rc<RefCell<Script>>);

impl ScriptedSensor {
    /// A source of `kind` with an empty script.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            script: Rc::default(),
        }
    }

    /// A source of `kind` that always reads `payload`.
    pub fn always(kind: SourceKind, payload: Payload) -> Self {
        let sensor = Self::new(kind);
        sensor.script.borrow_mut().fallback = Some(payload);
        sensor
    }

    /// Appends a successful poll.
    pub fn then_ok(self, payload: Payload) -> Self {
        self.push(Step::Reading {
            payload,
            valid: true,
        })
    }

    /// Appends a successful poll producing `reading`'s payload and validity.
    pub fn then_reading(self, reading: Reading) -> Self {
        self.push(Step::Reading {
            payload: reading.payload,
            valid: reading.valid,
        })
    }

    /// Appends a failed poll.
    pub fn then_err(self, error: PollError) -> Self {
        self.push(Step::Error(error))
    }

    /// Makes initialization fail.
    pub fn failing_init(self) -> Self {
        self.script.borrow_mut().fail_init = true;
        self
    }

    /// A handle to the script.
    pub fn handle(&self) -> ScriptedHandle {
        ScriptedHandle(Rc::clone(&self.script))
    }

    fn push(self, step: Step) -> Self {
        self.script.borrow_mut().steps.push_back(step);
        self
    }
}

impl ScriptedHandle {
    /// Number of polls so far.
    pub fn polls(&self) -> usize {
        self.0.borrow().polls
    }

    /// Number of initialization calls so far.
    pub fn init_calls(&self) -> usize {
        self.0.borrow().init_calls
    }

    /// Timeouts passed to the polls so far.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.0.borrow().timeouts.clone()
    }

    /// Appends a successful poll.
    pub fn push_ok(&self, payload: Payload) {
        self.0.borrow_mut().steps.push_back(Step::Reading {
            payload,
            valid: true,
        });
    }

    /// Appends a failed poll.
    pub fn push_err(&self, error: PollError) {
        self.0.borrow_mut().steps.push_back(Step::Error(error));
    }

    /// Replaces the fallback payload; `None` makes an exhausted script fail.
    pub fn set_fallback(&self, payload: Option<Payload>) {
        self.0.borrow_mut().fallback = payload;
    }
}

impl SensorCapability for ScriptedSensor {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn init(&mut self) -> Result<(), InitError> {
        let mut script = self.script.borrow_mut();
        script.init_calls += 1;
        if script.fail_init {
            return Err(InitError::NotResponding);
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration, at: Timestamp) -> Result<Reading, PollError> {
        let mut script = self.script.borrow_mut();
        script.polls += 1;
        script.timeouts.push(timeout);

        let step = match script.steps.pop_front() {
            Some(step) => step,
            None => match &script.fallback {
                Some(payload) => Step::Reading {
                    payload: payload.clone(),
                    valid: true,
                },
                None => Step::Error(PollError::Unavailable),
            },
        };
        match step {
            Step::Reading { payload, valid: true } => Ok(Reading::new(at, payload)),
            Step::Reading { payload, valid: false } => Ok(Reading::invalid(at, payload)),
            Step::Error(error) => Err(error),
        }
    }
}

#[derive(Debug, Default)]
struct MediumState {
    logs: BTreeMap<u32, Vec<u8>>,
    open_error: Option<StorageError>,
    append_error: Option<StorageError>,
    fail_next: usize,
    fail_next_error: Option<StorageError>,
    appends: usize,
    closes: usize,
}

/// Handle to a log in a [`MemoryMedium`].
#[derive(Debug)]
pub struct MemoryHandle {
    session: u32,
}

/// An in-memory storage medium with fault injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium(Rc<RefCell<MediumState>>);

impl MemoryMedium {
    /// An empty, healthy medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes of the log of `session`.
    pub fn log(&self, session: u32) -> Vec<u8> {
        self.0
            .borrow()
            .logs
            .get(&session)
            .cloned()
            .unwrap_or_default()
    }

    /// Sessions that have a log, in ascending order.
    pub fn sessions(&self) -> Vec<u32> {
        self.0.borrow().logs.keys().copied().collect()
    }

    /// Appends raw bytes to a log, bypassing the fault injection.
    pub fn append_raw(&self, session: u32, bytes: &[u8]) {
        self.0
            .borrow_mut()
            .logs
            .entry(session)
            .or_default()
            .extend_from_slice(bytes);
    }

    /// Makes every append fail with `error` until [`heal`](Self::heal).
    pub fn fail_appends(&self, error: StorageError) {
        self.0.borrow_mut().append_error = Some(error);
    }

    /// Makes the next `count` appends fail with `error`.
    pub fn fail_next_appends(&self, count: usize, error: StorageError) {
        let mut state = self.0.borrow_mut();
        state.fail_next = count;
        state.fail_next_error = Some(error);
    }

    /// Makes every open fail with `error` until [`heal`](Self::heal).
    pub fn fail_opens(&self, error: StorageError) {
        self.0.borrow_mut().open_error = Some(error);
    }

    /// Clears all injected faults.
    pub fn heal(&self) {
        let mut state = self.0.borrow_mut();
        state.open_error = None;
        state.append_error = None;
        state.fail_next = 0;
    }

    /// Number of append attempts, failed ones included.
    pub fn appends(&self) -> usize {
        self.0.borrow().appends
    }

    /// Number of closed handles.
    pub fn closes(&self) -> usize {
        self.0.borrow().closes
    }
}

impl StorageMedium for MemoryMedium {
    type Handle = MemoryHandle;

    fn open(&mut self, session_id: u32) -> Result<MemoryHandle, StorageError> {
        let mut state = self.0.borrow_mut();
        if let Some(error) = state.open_error {
            return Err(error);
        }
        state.logs.entry(session_id).or_default();
        Ok(MemoryHandle {
            session: session_id,
        })
    }

    fn append(&mut self, handle: &mut MemoryHandle, bytes: &[u8]) -> Result<(), StorageError> {
        let mut state = self.0.borrow_mut();
        state.appends += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(state.fail_next_error.unwrap_or(StorageError::WriteFailed));
        }
        if let Some(error) = state.append_error {
            return Err(error);
        }
        state
            .logs
            .entry(handle.session)
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self, _handle: MemoryHandle) {
        self.0.borrow_mut().closes += 1;
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    fail: Option<NetError>,
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A serial port that records everything written to it.
#[derive(Debug, Clone, Default)]
pub struct CapturePort(Rc<RefCell<Capture>>);

impl CapturePort {
    /// An empty port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far, without terminators.
    pub fn lines(&self) -> Vec<String> {
        split_lines(&self.0.borrow().bytes)
    }

    /// Makes writes fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<NetError>) {
        self.0.borrow_mut().fail = error;
    }
}

impl SerialPort for CapturePort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        let mut capture = self.0.borrow_mut();
        if let Some(error) = capture.fail {
            return Err(error);
        }
        capture.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SppState {
    profile: Option<String>,
    start_calls: usize,
    fail_start: bool,
    connected: bool,
    sent: Vec<u8>,
}

/// A BLE SPP server with a switchable central.
#[derive(Debug, Clone, Default)]
pub struct MockSpp(Rc<RefCell<SppState>>);

impl MockSpp {
    /// A server with nobody connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects or disconnects the central.
    pub fn set_connected(&self, connected: bool) {
        self.0.borrow_mut().connected = connected;
    }

    /// Makes [`SppServer::start`] fail.
    pub fn fail_start(&self, fail: bool) {
        self.0.borrow_mut().fail_start = fail;
    }

    /// Number of start attempts.
    pub fn start_calls(&self) -> usize {
        self.0.borrow().start_calls
    }

    /// Profile the server was started with.
    pub fn profile(&self) -> Option<String> {
        self.0.borrow().profile.clone()
    }

    /// Lines sent so far, without terminators.
    pub fn lines(&self) -> Vec<String> {
        split_lines(&self.0.borrow().sent)
    }
}

impl SppServer for MockSpp {
    fn start(&mut self, profile: &str) -> Result<(), NetError> {
        let mut state = self.0.borrow_mut();
        state.start_calls += 1;
        if state.fail_start {
            return Err(NetError::NetworkDown);
        }
        state.profile = Some(profile.to_owned());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        let mut state = self.0.borrow_mut();
        if !state.connected {
            return Err(NetError::NotConnected);
        }
        state.sent.extend_from_slice(bytes);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ClientState {
    received: Vec<u8>,
    fail: Option<NetError>,
    closed: bool,
}

/// The server side of a [`MockTcpServer`] connection.
#[derive(Debug)]
pub struct MockConnection(Rc<RefCell<ClientState>>);

/// The client side of a [`MockTcpServer`] connection.
#[derive(Debug, Clone)]
pub struct MockClient(Rc<RefCell<ClientState>>);

impl MockClient {
    /// Everything the server sent to this client.
    pub fn received(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow().received).into_owned()
    }

    /// Makes sends to this client fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<NetError>) {
        self.0.borrow_mut().fail = error;
    }

    /// Returns `true` once the server closed the connection.
    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }
}

impl TcpConnection for MockConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        let mut state = self.0.borrow_mut();
        if state.closed {
            return Err(NetError::ConnectionReset);
        }
        if let Some(error) = state.fail {
            return Err(error);
        }
        state.received.extend_from_slice(bytes);
        Ok(())
    }

    fn close(self) {
        self.0.borrow_mut().closed = true;
    }
}

#[derive(Debug, Default)]
struct ServerState {
    listening: Option<u16>,
    pending: VecDeque<MockConnection>,
    connects: u16,
}

/// A TCP server whose clients are created by the test.
#[derive(Debug, Clone, Default)]
pub struct MockTcpServer(Rc<RefCell<ServerState>>);

impl MockTcpServer {
    /// A server that is not listening yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a new client connection for the next accept.
    pub fn connect(&self) -> MockClient {
        let client = Rc::new(RefCell::new(ClientState::default()));
        let mut state = self.0.borrow_mut();
        state.connects += 1;
        state.pending.push_back(MockConnection(Rc::clone(&client)));
        MockClient(client)
    }

    /// Port the server listens on.
    pub fn listening_on(&self) -> Option<u16> {
        self.0.borrow().listening
    }
}

impl TcpServer for MockTcpServer {
    type Connection = MockConnection;

    fn listen(&mut self, port: u16) -> Result<(), NetError> {
        if port == 0 {
            return Err(NetError::InvalidPort);
        }
        self.0.borrow_mut().listening = Some(port);
        Ok(())
    }

    fn accept(&mut self) -> Result<Option<(MockConnection, SocketAddr)>, NetError> {
        let mut state = self.0.borrow_mut();
        if state.listening.is_none() {
            return Ok(None);
        }
        let peer_port = 50_000 + state.connects;
        Ok(state
            .pending
            .pop_front()
            .map(|connection| (connection, SocketAddr::from(([127, 0, 0, 1], peer_port)))))
    }
}

#[derive(Debug, Default)]
struct LinkState {
    joined: bool,
    begin_calls: usize,
    leave_calls: usize,
}

/// A network link joined and dropped by the test.
#[derive(Debug, Clone, Default)]
pub struct MockLink(Rc<RefCell<LinkState>>);

impl MockLink {
    /// A link that never joins until [`set_joined`](Self::set_joined).
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that is associated right away.
    pub fn joined() -> Self {
        let link = Self::default();
        link.set_joined(true);
        link
    }

    /// Associates or drops the link.
    pub fn set_joined(&self, joined: bool) {
        self.0.borrow_mut().joined = joined;
    }

    /// Number of join attempts.
    pub fn begin_calls(&self) -> usize {
        self.0.borrow().begin_calls
    }

    /// Number of times the link was left.
    pub fn leave_calls(&self) -> usize {
        self.0.borrow().leave_calls
    }
}

impl NetworkLink for MockLink {
    fn begin_join(&mut self) -> Result<(), NetError> {
        self.0.borrow_mut().begin_calls += 1;
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        self.0.borrow().joined
    }

    fn leave(&mut self) {
        let mut state = self.0.borrow_mut();
        state.leave_calls += 1;
        state.joined = false;
    }
}
