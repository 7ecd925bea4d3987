//! In-memory listening endpoint.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use btlink_core::{close_quietly, Closable, DeviceAddress, Endpoint, ServiceRecord, SocketHandle};
use tracing::trace;

use super::socket::LoopbackSocket;
use super::RadioInner;
use crate::application::workers::lock;

struct EndpointState {
    pending: VecDeque<Arc<LoopbackSocket>>,
    closed: bool,
}

/// A listening endpoint registered on the radio under
/// `(local address, service uuid)`.
///
/// Closing it unregisters it, closes connections nobody accepted yet and
/// makes a blocked `accept()` return an error.
pub struct LoopbackEndpoint {
    state: Mutex<EndpointState>,
    ready: Condvar,
    address: DeviceAddress,
    service: ServiceRecord,
    radio: Weak<RadioInner>,
}

impl LoopbackEndpoint {
    pub(super) fn new(radio: &Arc<RadioInner>, address: DeviceAddress, service: ServiceRecord) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EndpointState {
                pending: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
            address,
            service,
            radio: Arc::downgrade(radio),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EndpointState> {
        lock(&self.state)
    }

    /// Queues a freshly connected server-side socket for `accept()`.
    pub(super) fn offer(&self, socket: Arc<LoopbackSocket>) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} stopped listening", self.address),
            ));
        }
        state.pending.push_back(socket);
        self.ready.notify_all();
        Ok(())
    }
}

impl Closable for LoopbackEndpoint {
    fn close(&self) -> io::Result<()> {
        let pending = {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            self.ready.notify_all();
            std::mem::take(&mut state.pending)
        };
        trace!(address = %self.address, "loopback endpoint closed for {}", self.service);
        for socket in pending {
            close_quietly(&*socket, "unaccepted socket");
        }
        if let Some(radio) = self.radio.upgrade() {
            radio.unregister_listener(&self.address, self.service.uuid, self);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Endpoint for LoopbackEndpoint {
    fn service(&self) -> &ServiceRecord {
        &self.service
    }

    fn accept(&self) -> io::Result<SocketHandle> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "endpoint closed"));
            }
            if let Some(socket) = state.pending.pop_front() {
                return Ok(socket);
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}
