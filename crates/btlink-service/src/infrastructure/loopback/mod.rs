//! Loopback radio: an in-process [`Transport`] for demos and tests.
//!
//! # How it fits together (for beginners)
//!
//! A [`LoopbackRadio`] plays the role of "the air" shared by several
//! simulated devices.  Each device gets its own [`LoopbackTransport`] from
//! [`LoopbackRadio::adapter`]:
//!
//! ```text
//!              LoopbackRadio (listeners, connect behaviour, open resources)
//!             /                         \
//! adapter(AA:AA) ── listen() ──►  endpoint registered at (AA:AA, uuid)
//! adapter(BB:BB) ── create_socket(AA:AA).connect() ──► queued on that endpoint
//! ```
//!
//! The blocking calls behave like a radio stack's: `accept`, `connect` and
//! `read` block, and closing the resource from another thread makes them
//! return an error.  The radio counts every endpoint and socket it hands out
//! that has not been closed yet, so a test can assert nothing leaked.
//!
//! Per-device [`ConnectBehavior`] lets a test script failures: refuse the
//! connection, fail socket creation, or hang in `connect()` until cancelled.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use btlink_core::{
    Closable, Device, DeviceAddress, DiscoverySignal, EndpointHandle, ServiceRecord, SocketHandle,
    Transport,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::workers::lock;

mod discovery_bus;
mod endpoint;
mod socket;

pub use discovery_bus::DiscoveryBus;
pub use endpoint::LoopbackEndpoint;
pub use socket::LoopbackSocket;

/// How connect attempts *to* a device behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    /// Connect succeeds if the device is listening, otherwise is refused.
    #[default]
    Accept,
    /// `create_socket` fails with the given error kind.
    FailCreate(io::ErrorKind),
    /// `connect` fails with the given error kind.
    Refuse(io::ErrorKind),
    /// `connect` blocks until the socket is closed.
    Hang,
}

#[derive(Default)]
struct RadioState {
    devices: Vec<Device>,
    listeners: HashMap<(DeviceAddress, Uuid), Arc<LoopbackEndpoint>>,
    behaviors: HashMap<DeviceAddress, ConnectBehavior>,
    listen_failures: HashMap<DeviceAddress, io::ErrorKind>,
    sockets: Vec<Arc<LoopbackSocket>>,
    endpoints: Vec<Arc<LoopbackEndpoint>>,
}

pub(crate) struct RadioInner {
    state: Mutex<RadioState>,
}

impl RadioInner {
    fn lock(&self) -> MutexGuard<'_, RadioState> {
        lock(&self.state)
    }

    pub(crate) fn connect_behavior(&self, address: &DeviceAddress) -> ConnectBehavior {
        self.lock().behaviors.get(address).copied().unwrap_or_default()
    }

    pub(crate) fn listener(&self, address: &DeviceAddress, service: Uuid) -> Option<Arc<LoopbackEndpoint>> {
        self.lock()
            .listeners
            .get(&(address.clone(), service))
            .filter(|endpoint| !endpoint.is_closed())
            .cloned()
    }

    pub(crate) fn unregister_listener(&self, address: &DeviceAddress, service: Uuid, endpoint: &LoopbackEndpoint) {
        let mut state = self.lock();
        let key = (address.clone(), service);
        let registered = state
            .listeners
            .get(&key)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), endpoint));
        if registered {
            state.listeners.remove(&key);
        }
    }

    /// Remembers a socket for leak accounting.
    pub(crate) fn track(&self, socket: Arc<LoopbackSocket>) {
        let mut state = self.lock();
        state.sockets.retain(|s| !s.is_closed());
        state.sockets.push(socket);
    }
}

/// The shared medium all loopback adapters talk through.  Cheap to clone.
#[derive(Clone)]
pub struct LoopbackRadio {
    inner: Arc<RadioInner>,
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RadioInner {
                state: Mutex::new(RadioState::default()),
            }),
        }
    }

    /// Creates the transport for a simulated local device.
    ///
    /// The device becomes visible to [`scan`](Self::scan) from other adapters.
    pub fn adapter(&self, local: Device) -> LoopbackTransport {
        let mut state = self.inner.lock();
        if !state.devices.contains(&local) {
            state.devices.push(local.clone());
        }
        LoopbackTransport {
            radio: Arc::clone(&self.inner),
            local,
        }
    }

    /// Sets how connect attempts to `target` behave from now on.
    pub fn set_connect_behavior(&self, target: &DeviceAddress, behavior: ConnectBehavior) {
        self.inner.lock().behaviors.insert(target.clone(), behavior);
    }

    /// Makes the next `listen()` on `local`'s adapter fail with `kind`.
    pub fn fail_next_listen(&self, local: &DeviceAddress, kind: io::ErrorKind) {
        self.inner.lock().listen_failures.insert(local.clone(), kind);
    }

    /// Whether `address` currently has an open endpoint for `service`.
    pub fn is_listening(&self, address: &DeviceAddress, service: Uuid) -> bool {
        self.inner.listener(address, service).is_some()
    }

    /// Sockets handed out (either side) that are not closed yet.
    pub fn open_sockets(&self) -> usize {
        self.inner.lock().sockets.iter().filter(|s| !s.is_closed()).count()
    }

    /// Endpoints handed out that are not closed yet.
    pub fn open_endpoints(&self) -> usize {
        self.inner.lock().endpoints.iter().filter(|e| !e.is_closed()).count()
    }

    /// Simulates a discovery scan run by `scanner`.
    ///
    /// Publishes one "device found" signal per other device on the radio,
    /// then "scan finished".
    pub fn scan(&self, scanner: &DeviceAddress, bus: &DiscoveryBus) {
        let visible: Vec<Device> = self
            .inner
            .lock()
            .devices
            .iter()
            .filter(|d| d.address() != scanner)
            .cloned()
            .collect();
        debug!(scanner = %scanner, "scan sees {} device(s)", visible.len());
        for device in visible {
            bus.publish(&DiscoverySignal::DeviceFound(device));
        }
        bus.publish(&DiscoverySignal::ScanFinished);
    }
}

/// One simulated device's view of the radio.
#[derive(Clone)]
pub struct LoopbackTransport {
    radio: Arc<RadioInner>,
    local: Device,
}

impl LoopbackTransport {
    /// The device this adapter belongs to.
    pub fn local_device(&self) -> &Device {
        &self.local
    }
}

impl Transport for LoopbackTransport {
    fn listen(&self, service: &ServiceRecord) -> io::Result<EndpointHandle> {
        let address = self.local.address().clone();
        let mut state = self.radio.lock();
        if let Some(kind) = state.listen_failures.remove(&address) {
            return Err(io::Error::new(kind, format!("{address} could not open {service}")));
        }
        let key = (address.clone(), service.uuid);
        if state.listeners.get(&key).is_some_and(|e| !e.is_closed()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{address} is already listening for {service}"),
            ));
        }
        let endpoint = LoopbackEndpoint::new(&self.radio, address.clone(), service.clone());
        state.listeners.insert(key, Arc::clone(&endpoint));
        state.endpoints.retain(|e| !e.is_closed());
        state.endpoints.push(Arc::clone(&endpoint));
        info!(address = %address, "loopback listening for {service}");
        Ok(endpoint)
    }

    fn create_socket(&self, device: &Device, service: &ServiceRecord) -> io::Result<SocketHandle> {
        if let ConnectBehavior::FailCreate(kind) = self.radio.connect_behavior(device.address()) {
            return Err(io::Error::new(kind, format!("no socket for {device}")));
        }
        let socket = LoopbackSocket::outbound(&self.radio, self.local.clone(), device.clone(), service.uuid);
        self.radio.track(Arc::clone(&socket));
        Ok(socket)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
