//! Integration tests for the link state machine over the loopback radio.
//!
//! # Purpose
//!
//! These tests drive `LinkService` through its public API exactly as a host
//! would, with real worker threads and the in-memory radio underneath.  They
//! verify:
//!
//! - The inbound path: listen, accept one peer, run the pump, reset.
//! - The outbound path: connect, hand the socket to a session, stop.
//! - Failure paths: refused connects, socket creation failures, endpoint
//!   open failures.
//! - Cancellation: every blocking call (accept, connect, read) is released by
//!   `reset()`/`stop()`, and no endpoint or socket is left open.
//!
//! # Waiting on worker threads
//!
//! Workers run on their own threads, so assertions about their effects poll
//! with a deadline (`eventually`, `Harness::wait_for`) instead of sleeping a
//! fixed amount.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use btlink_core::{
    Closable, Device, DeviceAddress, Endpoint, EndpointHandle, LinkStatus, ServiceRecord, Socket,
    SocketHandle, SocketStream, Transport,
};
use btlink_service::infrastructure::loopback::{ConnectBehavior, LoopbackRadio, LoopbackTransport};
use btlink_service::{ChannelListener, LinkConfig, LinkEvent, LinkService, SessionPump};
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(3);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn device(addr: &str) -> Device {
    Device::unbonded(DeviceAddress::parse(addr).unwrap())
}

/// Polls `condition` every few milliseconds until it holds or `TIMEOUT` passes.
fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Echoes every line back until the peer closes or the socket is closed.
fn echo_pump(socket: &dyn Socket) {
    let mut reader = BufReader::new(SocketStream::new(socket));
    let mut writer = SocketStream::new(socket);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                if writer.write_all(line.as_bytes()).is_err() {
                    return;
                }
            }
        }
    }
}

/// Sends `line` and returns the echoed reply.
fn exchange(socket: &dyn Socket, line: &str) -> io::Result<String> {
    SocketStream::new(socket).write_all(format!("{line}\n").as_bytes())?;
    let mut reply = String::new();
    BufReader::new(SocketStream::new(socket)).read_line(&mut reply)?;
    Ok(reply.trim_end().to_string())
}

/// Opens a plain endpoint on `adapter` and echoes for one accepted peer in a
/// background thread.  The endpoint closes after the first accept and the
/// socket closes when the peer goes away.
fn spawn_echo_server(adapter: &LoopbackTransport) {
    let endpoint: EndpointHandle = adapter.listen(&ServiceRecord::default()).expect("listen");
    thread::spawn(move || {
        let accepted = endpoint.accept();
        let _ = endpoint.close();
        if let Ok(socket) = accepted {
            echo_pump(&*socket);
            let _ = socket.close();
        }
    });
}

/// The link under test on device `AA`, plus a second device `BB` on the same
/// radio acting as the remote peer.
struct Harness {
    radio: LoopbackRadio,
    peer: LoopbackTransport,
    service: LinkService,
    events: mpsc::Receiver<LinkEvent>,
    seen: Vec<LinkEvent>,
}

impl Harness {
    fn new() -> Self {
        Self::with_pump(echo_pump)
    }

    fn with_pump(pump: impl SessionPump) -> Self {
        let radio = LoopbackRadio::new();
        let local = radio.adapter(device("AA"));
        let peer = radio.adapter(device("BB"));
        let (listener, events) = ChannelListener::new(256);
        let service = LinkService::new(
            Arc::new(local),
            Arc::new(listener),
            Arc::new(pump),
            LinkConfig::default(),
        );
        Self {
            radio,
            peer,
            service,
            events,
            seen: Vec::new(),
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.seen.push(event);
        }
    }

    /// Waits until an event matching `predicate` has been received.
    fn wait_for(&mut self, predicate: impl Fn(&LinkEvent) -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            self.drain();
            if self.seen.iter().any(&predicate) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn count(&mut self, predicate: impl Fn(&LinkEvent) -> bool) -> usize {
        self.drain();
        self.seen.iter().filter(|e| predicate(e)).count()
    }

    fn position(&self, predicate: impl Fn(&LinkEvent) -> bool) -> Option<usize> {
        self.seen.iter().position(predicate)
    }

    fn wait_until_listening(&self) -> bool {
        let uuid = ServiceRecord::default().uuid;
        eventually(|| self.radio.is_listening(&DeviceAddress::parse("AA").unwrap(), uuid))
    }

    /// Connects the peer device to the link and returns the peer's socket.
    fn dial_in(&self) -> SocketHandle {
        assert!(self.wait_until_listening(), "link never started listening");
        let socket = self
            .peer
            .create_socket(&device("AA"), &ServiceRecord::default())
            .expect("create socket");
        socket.connect().expect("peer connect");
        socket
    }

    fn nothing_open(&self) -> bool {
        eventually(|| self.radio.open_sockets() == 0 && self.radio.open_endpoints() == 0)
    }
}

// ── Inbound path ──────────────────────────────────────────────────────────────

/// Listen, accept one peer, echo a line, let the peer hang up, then reset.
///
/// The link stays `Connected` after the session ends until the host resets.
#[test]
fn test_inbound_connection_runs_session_until_peer_closes() {
    // Arrange
    let mut h = Harness::new();
    h.service.listen().expect("listen");

    // Act
    let remote = h.dial_in();
    let reply = exchange(&*remote, "ping").expect("exchange");

    // Assert: connected to BB with the request announced first
    assert_eq!(reply, "ping");
    assert!(h.wait_for(|e| matches!(e, LinkEvent::InboundConnection { .. })));
    assert_eq!(h.service.status(), LinkStatus::Connected { device: device("BB") });
    let request = h.position(|e| matches!(e, LinkEvent::InboundConnectionRequestReceived { .. }));
    let inbound = h.position(|e| matches!(e, LinkEvent::InboundConnection { .. }));
    assert!(
        request.is_some() && request < inbound,
        "request must be announced before the connection"
    );

    // Single-connection policy: nobody is listening any more
    assert!(eventually(|| h.radio.open_endpoints() == 0));

    // Act: the peer hangs up
    remote.close().unwrap();

    // Assert: the session ends but the link waits for the host
    assert!(h.wait_for(|e| matches!(e, LinkEvent::SessionEnded { .. })));
    assert_eq!(h.service.status(), LinkStatus::Connected { device: device("BB") });

    h.service.reset();
    assert_eq!(h.service.status(), LinkStatus::Idle);
    assert!(h.nothing_open());
}

#[test]
fn test_listen_twice_keeps_single_acceptor() {
    // Arrange
    let mut h = Harness::new();

    // Act
    h.service.listen().unwrap();
    h.service.listen().unwrap();

    // Assert
    assert!(h.wait_until_listening());
    assert_eq!(h.radio.open_endpoints(), 1);
    let to_listening = h.count(|e| {
        matches!(e, LinkEvent::StateChanged { new: LinkStatus::Listening, .. })
    });
    assert_eq!(to_listening, 1);
}

/// `reset()` closes the endpoint, which releases the blocked `accept()`
/// without reporting a failure.
#[test]
fn test_reset_releases_pending_accept_silently() {
    // Arrange
    let mut h = Harness::new();
    h.service.listen().unwrap();
    assert!(h.wait_until_listening());

    // Act
    h.service.reset();

    // Assert
    assert_eq!(h.service.status(), LinkStatus::Idle);
    assert!(h.nothing_open());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.count(|e| matches!(e, LinkEvent::ListenFailed { .. })), 0);
}

#[test]
fn test_listen_failure_returns_to_idle_and_can_retry() {
    // Arrange
    let mut h = Harness::new();
    h.radio
        .fail_next_listen(&DeviceAddress::parse("AA").unwrap(), io::ErrorKind::PermissionDenied);

    // Act
    h.service.listen().unwrap();

    // Assert
    assert!(h.wait_for(|e| matches!(e, LinkEvent::ListenFailed { .. })));
    assert!(eventually(|| h.service.status() == LinkStatus::Idle));

    // A second attempt succeeds.
    h.service.listen().unwrap();
    assert!(h.wait_until_listening());
    assert_eq!(h.service.status(), LinkStatus::Listening);
}

/// A pump that panics must not leak the socket or skip the "ended" report.
#[test]
fn test_panicking_pump_still_closes_socket() {
    // Arrange
    let mut h = Harness::with_pump(|_socket: &dyn Socket| panic!("host pump bug"));
    h.service.listen().unwrap();

    // Act
    let remote = h.dial_in();

    // Assert: the peer sees end-of-stream and the session reports it ended
    assert!(h.wait_for(|e| matches!(e, LinkEvent::SessionEnded { .. })));
    let mut buf = [0u8; 4];
    assert_eq!(remote.read(&mut buf).unwrap(), 0);
    remote.close().unwrap();
    h.service.reset();
    assert!(h.nothing_open());
}

// ── Outbound path ─────────────────────────────────────────────────────────────

#[test]
fn test_connect_hands_socket_to_session() {
    // Arrange
    let mut h = Harness::new();
    spawn_echo_server(&h.peer);

    // Act
    h.service.connect(device("BB")).unwrap();

    // Assert
    assert!(h.wait_for(|e| matches!(e, LinkEvent::Connected { .. })));
    assert_eq!(h.service.status(), LinkStatus::Connected { device: device("BB") });
    let before = h.position(|e| matches!(e, LinkEvent::BeforeConnect { .. }));
    let connected = h.position(|e| matches!(e, LinkEvent::Connected { .. }));
    assert!(before.is_some() && before < connected);
    assert_eq!(h.count(|e| matches!(e, LinkEvent::ConnectionFailed { .. })), 0);
}

/// `stop()` closes the session socket, which unblocks the pump's read.
#[test]
fn test_stop_closes_active_session() {
    // Arrange
    let mut h = Harness::new();
    spawn_echo_server(&h.peer);
    h.service.connect(device("BB")).unwrap();
    assert!(h.wait_for(|e| matches!(e, LinkEvent::Connected { .. })));

    // Act
    h.service.stop();

    // Assert: both ends closed (the echo server closes on end-of-stream)
    assert_eq!(h.service.status(), LinkStatus::Idle);
    assert!(h.nothing_open());
}

#[test]
fn test_refused_connect_reports_failure_once() {
    // Arrange: BB is not listening
    let mut h = Harness::new();

    // Act
    h.service.connect(device("BB")).unwrap();

    // Assert
    assert!(h.wait_for(|e| matches!(e, LinkEvent::ConnectionFailed { .. })));
    assert!(eventually(|| h.service.status() == LinkStatus::Idle));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.count(|e| matches!(e, LinkEvent::ConnectionFailed { .. })), 1);
    assert_eq!(h.count(|e| matches!(e, LinkEvent::Connected { .. })), 0);
    assert!(h.nothing_open());
}

/// A second `connect()` supersedes the first: the hanging attempt to `CC`
/// is aborted silently and only `BB` connects.
#[test]
fn test_second_connect_supersedes_pending_attempt() {
    // Arrange
    let mut h = Harness::new();
    let hanging = h.radio.adapter(device("CC"));
    h.radio
        .set_connect_behavior(hanging.local_device().address(), ConnectBehavior::Hang);
    spawn_echo_server(&h.peer);
    h.service.connect(device("CC")).unwrap();
    assert!(h.wait_for(|e| matches!(e, LinkEvent::BeforeConnect { device: d } if *d == device("CC"))));

    // Act
    h.service.connect(device("BB")).unwrap();

    // Assert
    assert!(h.wait_for(|e| matches!(e, LinkEvent::Connected { .. })));
    assert_eq!(h.service.status(), LinkStatus::Connected { device: device("BB") });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.count(|e| matches!(e, LinkEvent::ConnectionFailed { .. })), 0);
    // Only the BB connection remains: its two ends.
    assert!(eventually(|| h.radio.open_sockets() == 2));

    h.service.stop();
    assert!(h.nothing_open());
}

/// `connect()` while listening cancels the acceptor.
#[test]
fn test_connect_while_listening_cancels_acceptor() {
    // Arrange
    let mut h = Harness::new();
    h.service.listen().unwrap();
    assert!(h.wait_until_listening());
    spawn_echo_server(&h.peer);

    // Act
    h.service.connect(device("BB")).unwrap();

    // Assert
    assert!(h.wait_for(|e| matches!(e, LinkEvent::Connected { .. })));
    let uuid = ServiceRecord::default().uuid;
    assert!(!h.radio.is_listening(&DeviceAddress::parse("AA").unwrap(), uuid));
}

#[test]
fn test_restart_listening_from_connected_session() {
    // Arrange
    let mut h = Harness::new();
    spawn_echo_server(&h.peer);
    h.service.connect(device("BB")).unwrap();
    assert!(h.wait_for(|e| matches!(e, LinkEvent::Connected { .. })));

    // Act
    h.service.restart_listening().unwrap();

    // Assert
    assert_eq!(h.service.status(), LinkStatus::Listening);
    assert!(h.wait_until_listening());
    assert!(eventually(|| h.radio.open_sockets() == 0));
}

#[test]
fn test_restart_connect_from_listening() {
    // Arrange
    let mut h = Harness::new();
    h.service.listen().unwrap();
    assert!(h.wait_until_listening());
    spawn_echo_server(&h.peer);

    // Act
    h.service.restart_connect(device("BB")).unwrap();

    // Assert
    assert!(h.wait_for(|e| matches!(e, LinkEvent::Connected { .. })));
    assert_eq!(h.service.status(), LinkStatus::Connected { device: device("BB") });
    let uuid = ServiceRecord::default().uuid;
    assert!(!h.radio.is_listening(&DeviceAddress::parse("AA").unwrap(), uuid));
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[test]
fn test_reset_and_stop_are_idempotent() {
    let h = Harness::new();

    h.service.reset();
    h.service.stop();
    h.service.reset();

    assert_eq!(h.service.status(), LinkStatus::Idle);
}

#[test]
fn test_dropping_service_stops_link() {
    // Arrange
    let h = Harness::new();
    h.service.listen().unwrap();
    assert!(h.wait_until_listening());
    let radio = h.radio.clone();

    // Act
    drop(h);

    // Assert
    assert!(eventually(|| radio.open_endpoints() == 0));
}

/// Hammering the public operations from the host thread never opens a second
/// endpoint, and a final `stop()` cleans up everything.
#[test]
fn test_rapid_commands_leave_nothing_open() {
    // Arrange
    let h = Harness::new();

    // Act
    for round in 0..20 {
        match round % 4 {
            0 => h.service.listen().unwrap(),
            1 => h.service.connect(device("BB")).unwrap(),
            2 => h.service.reset(),
            _ => h.service.connect(device("ZZ")).unwrap(),
        }
        assert!(h.radio.open_endpoints() <= 1);
    }
    h.service.stop();

    // Assert
    assert_eq!(h.service.status(), LinkStatus::Idle);
    assert!(h.nothing_open());
}

// ── Scripted transport ────────────────────────────────────────────────────────

mockall::mock! {
    pub Radio {}
    impl Transport for Radio {
        fn listen(&self, service: &ServiceRecord) -> io::Result<EndpointHandle>;
        fn create_socket(&self, device: &Device, service: &ServiceRecord) -> io::Result<SocketHandle>;
    }
}

fn service_over(transport: MockRadio) -> (LinkService, mpsc::Receiver<LinkEvent>) {
    let (listener, events) = ChannelListener::new(64);
    let service = LinkService::new(
        Arc::new(transport),
        Arc::new(listener),
        Arc::new(echo_pump),
        LinkConfig::default(),
    );
    (service, events)
}

/// Collects events until one matches `predicate` or the deadline passes.
fn collect_until(
    events: &mut mpsc::Receiver<LinkEvent>,
    predicate: impl Fn(&LinkEvent) -> bool,
) -> Vec<LinkEvent> {
    let mut seen = Vec::new();
    let found = eventually(|| {
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen.iter().any(&predicate)
    });
    assert!(found, "expected event not received; saw {seen:?}");
    seen
}

/// One-shot gate: `wait` blocks until `open` has been called.
#[derive(Default)]
struct Latch {
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicBool,
}

impl Latch {
    fn wait(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn is_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Socket whose `connect` waits on a latch and ignores `close()`, so a test
/// decides when a blocked connect completes.  `read` ends once closed.
struct ScriptedSocket {
    remote: Device,
    connect_gate: Option<Arc<Latch>>,
    hangup: Latch,
    closes: AtomicUsize,
}

impl ScriptedSocket {
    fn new(remote: Device, connect_gate: Option<Arc<Latch>>) -> Arc<Self> {
        Arc::new(Self {
            remote,
            connect_gate,
            hangup: Latch::default(),
            closes: AtomicUsize::new(0),
        })
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Closable for ScriptedSocket {
    fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.hangup.open();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closes() > 0
    }
}

impl Socket for ScriptedSocket {
    fn remote_device(&self) -> Device {
        self.remote.clone()
    }

    fn connect(&self) -> io::Result<()> {
        if let Some(gate) = &self.connect_gate {
            gate.wait();
        }
        Ok(())
    }

    fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
        self.hangup.wait();
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
}

/// Endpoint whose `accept` waits on a latch and ignores `close()`, then
/// yields its one socket.
struct ScriptedEndpoint {
    service: ServiceRecord,
    accept_gate: Arc<Latch>,
    socket: Mutex<Option<SocketHandle>>,
    closes: AtomicUsize,
}

impl Closable for ScriptedEndpoint {
    fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }
}

impl Endpoint for ScriptedEndpoint {
    fn service(&self) -> &ServiceRecord {
        &self.service
    }

    fn accept(&self) -> io::Result<SocketHandle> {
        self.accept_gate.wait();
        self.socket
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "already accepted"))
    }
}

/// A peer accepted after `reset()` has already left `Listening` is closed
/// and never announced.
#[test]
fn test_accept_completing_after_reset_closes_socket_silently() {
    // Arrange: accept() ignores close, so it completes after the reset
    let gate = Arc::new(Latch::default());
    let accepted = ScriptedSocket::new(device("BB"), None);
    let endpoint = Arc::new(ScriptedEndpoint {
        service: ServiceRecord::default(),
        accept_gate: Arc::clone(&gate),
        socket: Mutex::new(Some(Arc::clone(&accepted) as SocketHandle)),
        closes: AtomicUsize::new(0),
    });
    let mut transport = MockRadio::new();
    let handed_out = Arc::clone(&endpoint);
    transport
        .expect_listen()
        .times(1)
        .returning(move |_| Ok(Arc::clone(&handed_out) as EndpointHandle));
    let (service, mut events) = service_over(transport);
    service.listen().unwrap();
    assert!(eventually(|| gate.is_entered()), "acceptor never blocked in accept");

    // Act
    service.reset();
    gate.open();

    // Assert
    assert!(eventually(|| accepted.closes() == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(accepted.closes(), 1, "accepted socket must be closed exactly once");
    assert_eq!(service.status(), LinkStatus::Idle);
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(
        !seen.iter().any(|e| matches!(
            e,
            LinkEvent::InboundConnection { .. } | LinkEvent::InboundConnectionRequestReceived { .. }
        )),
        "stale accept was announced: {seen:?}"
    );
    assert!(endpoint.closes.load(Ordering::SeqCst) >= 1);
}

/// An attempt superseded while its connect was already in flight may still
/// succeed; that success changes nothing and its socket ends up closed once.
#[test]
fn test_superseded_connect_that_succeeds_is_discarded() {
    // Arrange: the connect to AA ignores close and completes when released
    let gate = Arc::new(Latch::default());
    let first = ScriptedSocket::new(device("AA"), Some(Arc::clone(&gate)));
    let second = ScriptedSocket::new(device("BB"), None);
    let mut transport = MockRadio::new();
    let (first_out, second_out) = (Arc::clone(&first), Arc::clone(&second));
    transport
        .expect_create_socket()
        .times(2)
        .returning(move |target, _| {
            let socket = if *target == device("AA") { &first_out } else { &second_out };
            Ok(Arc::clone(socket) as SocketHandle)
        });
    let (service, mut events) = service_over(transport);
    service.connect(device("AA")).unwrap();
    assert!(eventually(|| gate.is_entered()), "first attempt never blocked in connect");

    service.connect(device("BB")).unwrap();
    let seen = collect_until(&mut events, |e| matches!(e, LinkEvent::Connected { .. }));

    // Act: the superseded attempt now succeeds
    gate.open();

    // Assert
    assert!(eventually(|| first.closes() == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(first.closes(), 1, "superseded socket must be closed exactly once");
    assert_eq!(second.closes(), 0, "current session must be untouched");
    assert_eq!(service.status(), LinkStatus::Connected { device: device("BB") });
    let mut all = seen;
    while let Ok(event) = events.try_recv() {
        all.push(event);
    }
    let connected: Vec<&LinkEvent> = all
        .iter()
        .filter(|e| matches!(e, LinkEvent::Connected { .. }))
        .collect();
    assert_eq!(connected.len(), 1, "events were {all:?}");
    assert!(matches!(connected[0], LinkEvent::Connected { device: d } if *d == device("BB")));
    assert!(!all.iter().any(|e| matches!(e, LinkEvent::ConnectionFailed { .. })));

    service.stop();
    assert!(eventually(|| second.closes() == 1));
}

#[test]
fn test_socket_create_failure_reports_connection_failed() {
    // Arrange
    let mut transport = MockRadio::new();
    transport
        .expect_create_socket()
        .times(1)
        .returning(|_, _| Err(io::Error::new(io::ErrorKind::NotFound, "adapter off")));
    let (service, mut events) = service_over(transport);

    // Act
    service.connect(device("BB")).unwrap();

    // Assert
    let seen = collect_until(&mut events, |e| matches!(e, LinkEvent::ConnectionFailed { .. }));
    match seen.iter().find(|e| matches!(e, LinkEvent::ConnectionFailed { .. })) {
        Some(LinkEvent::ConnectionFailed { device: d, reason }) => {
            assert_eq!(*d, device("BB"));
            assert!(reason.contains("failed to create socket"), "reason was {reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(eventually(|| service.status() == LinkStatus::Idle));
}

#[test]
fn test_endpoint_open_failure_reports_listen_failed() {
    // Arrange
    let mut transport = MockRadio::new();
    transport
        .expect_listen()
        .times(1)
        .returning(|_| Err(io::Error::new(io::ErrorKind::AddrInUse, "channel busy")));
    let (service, mut events) = service_over(transport);

    // Act
    service.listen().unwrap();

    // Assert
    let seen = collect_until(&mut events, |e| matches!(e, LinkEvent::ListenFailed { .. }));
    assert!(seen
        .iter()
        .any(|e| matches!(e, LinkEvent::ListenFailed { reason } if reason.contains("channel busy"))));
    assert!(eventually(|| service.status() == LinkStatus::Idle));
}
