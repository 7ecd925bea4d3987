//! LinkService: the single-link connection state machine.
//!
//! # State model (for beginners)
//!
//! The link is always in exactly one of four states.  The worker that backs a
//! state is stored *inside* the state value, so combinations such as
//! "connected but no session" or "listening and connecting at once" cannot be
//! written down:
//!
//! ```text
//! Link::Idle
//! Link::Listening(AcceptorHandle)
//! Link::Connecting(InitiatorHandle)
//! Link::Connected(SessionHandle)
//! ```
//!
//! Replacing the state value cancels the worker held by the old value, which
//! closes that worker's endpoint or socket and unblocks it.  The single
//! exception is the hand-off from `Connecting` to `Connected`, where the
//! initiator's socket is detached and passed to the new session instead.
//!
//! # Transitions
//!
//! | From       | Event                           | To         |
//! |------------|---------------------------------|------------|
//! | Idle       | `listen()`                      | Listening  |
//! | Listening  | inbound accepted, still current | Connected  |
//! | Listening  | acceptor failed                 | Idle       |
//! | any        | `connect(d)`                    | Connecting |
//! | Connecting | connect succeeded               | Connected  |
//! | Connecting | connect failed                  | Idle       |
//! | any        | `reset()` / `stop()`            | Idle       |
//!
//! # Locking
//!
//! One mutex guards the state.  Public methods and every worker callback take
//! it before reading or writing the state, so a cancellation racing with a
//! worker's success is decided by whoever locks first.  Each worker carries a
//! [`WorkerId`]; a callback whose id is not the one held by the current state
//! belongs to a superseded worker and does nothing except close any socket it
//! carries.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use btlink_core::{close_quietly, Device, LinkStatus, ServiceRecord, SocketHandle, Transport};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::listener::LinkListener;
use crate::application::workers::acceptor::AcceptorHandle;
use crate::application::workers::initiator::InitiatorHandle;
use crate::application::workers::session::SessionHandle;
use crate::application::workers::{lock, LinkFailure, SessionPump, WorkerId, WorkerRole};

/// Error returned by the public [`LinkService`] operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The OS refused to create a worker thread.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: WorkerRole,
        #[source]
        source: io::Error,
    },
}

/// Runtime settings for a [`LinkService`].
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// Service the acceptor advertises and the initiator targets.
    pub service: ServiceRecord,
}

/// The state value; each connected variant owns its worker.
enum Link {
    Idle,
    Listening(AcceptorHandle),
    Connecting(InitiatorHandle),
    Connected(SessionHandle),
}

impl Link {
    fn status(&self) -> LinkStatus {
        match self {
            Link::Idle => LinkStatus::Idle,
            Link::Listening(_) => LinkStatus::Listening,
            Link::Connecting(initiator) => LinkStatus::Connecting {
                device: initiator.device().clone(),
            },
            Link::Connected(session) => LinkStatus::Connected {
                device: session.device().clone(),
            },
        }
    }

    fn cancel(self) {
        match self {
            Link::Idle => {}
            Link::Listening(acceptor) => acceptor.cancel(),
            Link::Connecting(initiator) => initiator.cancel(),
            Link::Connected(session) => session.cancel(),
        }
    }
}

struct LinkCore {
    link: Link,
    last_worker: u64,
}

impl LinkCore {
    fn next_worker_id(&mut self) -> WorkerId {
        self.last_worker += 1;
        WorkerId(self.last_worker)
    }
}

/// State shared between the service handle and its worker threads.
pub(crate) struct LinkShared {
    core: Mutex<LinkCore>,
    transport: Arc<dyn Transport>,
    listener: Arc<dyn LinkListener>,
    pump: Arc<dyn SessionPump>,
    config: LinkConfig,
}

/// Host-facing handle to the link state machine.
///
/// Dropping the handle stops the link.
pub struct LinkService {
    shared: Arc<LinkShared>,
}

impl LinkService {
    /// Creates an idle link.
    ///
    /// - `transport` – the platform's radio stack.
    /// - `listener`  – receives the notifications; see [`LinkListener`].
    /// - `pump`      – the data pump each session runs over its socket.
    pub fn new(
        transport: Arc<dyn Transport>,
        listener: Arc<dyn LinkListener>,
        pump: Arc<dyn SessionPump>,
        config: LinkConfig,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                core: Mutex::new(LinkCore {
                    link: Link::Idle,
                    last_worker: 0,
                }),
                transport,
                listener,
                pump,
                config,
            }),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn status(&self) -> LinkStatus {
        self.shared.lock().link.status()
    }

    /// Starts listening for one inbound peer.
    ///
    /// Idempotent: if an acceptor is already running it is left alone.  An
    /// in-flight connect attempt or an active session is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Spawn`] if the acceptor thread cannot be started;
    /// the link is then idle.
    pub fn listen(&self) -> Result<(), LinkError> {
        let shared = &self.shared;
        let mut core = shared.lock();
        if let Link::Listening(acceptor) = &core.link {
            debug!(worker = %acceptor.id(), "already listening");
            return Ok(());
        }

        let id = core.next_worker_id();
        match AcceptorHandle::spawn(Arc::clone(shared), id) {
            Ok(acceptor) => {
                info!(worker = %id, "listening for {}", shared.config.service);
                shared.transition(&mut core, Link::Listening(acceptor));
                Ok(())
            }
            Err(e) => {
                shared.transition(&mut core, Link::Idle);
                Err(e)
            }
        }
    }

    /// Starts an outbound connection attempt to `device`.
    ///
    /// Whatever the link was doing is cancelled first, so afterwards exactly
    /// one initiator is alive and no session is.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Spawn`] if the initiator thread cannot be started;
    /// the link is then idle.
    pub fn connect(&self, device: Device) -> Result<(), LinkError> {
        let shared = &self.shared;
        let mut core = shared.lock();
        let id = core.next_worker_id();
        debug!(worker = %id, device = %device, "starting connect attempt");
        match InitiatorHandle::spawn(Arc::clone(shared), id, device) {
            Ok(initiator) => {
                shared.transition(&mut core, Link::Connecting(initiator));
                Ok(())
            }
            Err(e) => {
                shared.transition(&mut core, Link::Idle);
                Err(e)
            }
        }
    }

    /// Cancels any worker and returns to idle.  Idempotent.
    pub fn reset(&self) {
        let mut core = self.shared.lock();
        self.shared.transition(&mut core, Link::Idle);
    }

    /// Shuts the link down, closing every open endpoint and socket.
    pub fn stop(&self) {
        let mut core = self.shared.lock();
        if !matches!(core.link, Link::Idle) {
            info!("stopping link");
        }
        self.shared.transition(&mut core, Link::Idle);
    }

    /// `reset()` followed by `listen()`, as one host command.
    ///
    /// # Errors
    ///
    /// See [`listen`](Self::listen).
    pub fn restart_listening(&self) -> Result<(), LinkError> {
        self.reset();
        self.listen()
    }

    /// `reset()` followed by `connect(device)`, as one host command.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub fn restart_connect(&self, device: Device) -> Result<(), LinkError> {
        self.reset();
        self.connect(device)
    }
}

impl Drop for LinkService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LinkShared {
    fn lock(&self) -> MutexGuard<'_, LinkCore> {
        lock(&self.core)
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn service(&self) -> &ServiceRecord {
        &self.config.service
    }

    pub(crate) fn pump(&self) -> &dyn SessionPump {
        self.pump.as_ref()
    }

    /// Replaces the state, cancels the worker of the old state and notifies
    /// the listener if the observable status changed.
    fn transition(&self, core: &mut LinkCore, next: Link) {
        let old = core.link.status();
        let previous = std::mem::replace(&mut core.link, next);
        previous.cancel();
        let new = core.link.status();
        if old != new {
            debug!("link state {old} -> {new}");
            self.listener.on_state_changed(&old, &new);
        }
    }

    /// Starts a session for `socket` and moves to `Connected`.
    ///
    /// On spawn failure the socket is closed and the link goes idle.
    fn start_session(
        self: &Arc<Self>,
        core: &mut LinkCore,
        device: Device,
        socket: SocketHandle,
    ) -> Result<(), LinkFailure> {
        let id = core.next_worker_id();
        match SessionHandle::spawn(Arc::clone(self), id, device, Arc::clone(&socket)) {
            Ok(session) => {
                self.transition(core, Link::Connected(session));
                Ok(())
            }
            Err(LinkError::Spawn { source, .. }) => {
                close_quietly(&*socket, "socket");
                self.transition(core, Link::Idle);
                Err(LinkFailure::Spawn(source))
            }
        }
    }

    // ── Acceptor callbacks ────────────────────────────────────────────────────

    /// An inbound connection from `device` was accepted by acceptor `id`.
    pub(crate) fn inbound_request_received(&self, id: WorkerId, device: &Device) {
        let core = self.lock();
        match &core.link {
            Link::Listening(acceptor) if acceptor.id() == id => {
                self.listener.on_inbound_connection_request_received(device);
            }
            _ => debug!(worker = %id, device = %device, "ignoring request from stale acceptor"),
        }
    }

    /// Keeps the accepted `socket` if acceptor `id` is still current,
    /// otherwise closes it.
    pub(crate) fn inbound_connection(self: &Arc<Self>, id: WorkerId, socket: SocketHandle) {
        let mut core = self.lock();
        let device = socket.remote_device();
        let current = matches!(&core.link, Link::Listening(acceptor) if acceptor.id() == id);
        if !current {
            debug!(worker = %id, device = %device, "no longer listening; closing accepted socket");
            close_quietly(&*socket, "accepted socket");
            return;
        }

        // Single-connection policy: the session replaces the acceptor.
        match self.start_session(&mut core, device.clone(), socket) {
            Ok(()) => {
                info!(device = %device, "inbound connection established");
                self.listener.on_inbound_connection(&device);
            }
            Err(failure) => {
                warn!(device = %device, "{failure}");
                self.listener.on_listen_failed(&failure);
            }
        }
    }

    /// Acceptor `id` has exited.  A failure while it is still current takes
    /// the link back to idle.
    pub(crate) fn acceptor_exited(&self, id: WorkerId, failure: Option<LinkFailure>) {
        let mut core = self.lock();
        let current = matches!(&core.link, Link::Listening(acceptor) if acceptor.id() == id);
        if !current {
            return;
        }
        self.transition(&mut core, Link::Idle);
        if let Some(failure) = failure {
            self.listener.on_listen_failed(&failure);
        }
    }

    // ── Initiator callbacks ───────────────────────────────────────────────────

    /// Initiator `id` is about to open its socket.
    pub(crate) fn before_connect(&self, id: WorkerId, device: &Device) {
        let core = self.lock();
        if matches!(&core.link, Link::Connecting(initiator) if initiator.id() == id) {
            self.listener.on_before_connect(device);
        }
    }

    /// Initiator `id` connected `socket`.  Hands the socket to a new session
    /// if the attempt is still current, otherwise closes it.
    pub(crate) fn connected(self: &Arc<Self>, id: WorkerId, socket: SocketHandle) {
        let mut core = self.lock();
        let device = match &core.link {
            Link::Connecting(initiator) if initiator.id() == id => {
                // Ownership moves to the session; the initiator must not close it.
                initiator.detach();
                initiator.device().clone()
            }
            _ => {
                debug!(worker = %id, "connect attempt superseded; closing socket");
                close_quietly(&*socket, "superseded socket");
                return;
            }
        };

        match self.start_session(&mut core, device.clone(), socket) {
            Ok(()) => {
                info!(device = %device, "outbound connection established");
                self.listener.on_connected(&device);
            }
            Err(failure) => {
                warn!(device = %device, "{failure}");
                self.listener.on_connection_failed(&device, &failure);
            }
        }
    }

    /// Initiator `id` failed.  Resets the link if the attempt is current.
    pub(crate) fn connection_failed(&self, id: WorkerId, device: &Device, failure: LinkFailure) {
        let mut core = self.lock();
        if !matches!(&core.link, Link::Connecting(initiator) if initiator.id() == id) {
            debug!(worker = %id, device = %device, "ignoring failure of superseded attempt");
            return;
        }
        self.transition(&mut core, Link::Idle);
        self.listener.on_connection_failed(device, &failure);
    }

    // ── Session callbacks ─────────────────────────────────────────────────────

    /// Session `id` finished and closed its socket.
    pub(crate) fn session_ended(&self, id: WorkerId, device: &Device) {
        let core = self.lock();
        if matches!(&core.link, Link::Connected(session) if session.id() == id) {
            info!(device = %device, "session ended");
            self.listener.on_session_ended(device);
        }
    }
}
