//! Initiator: makes one outbound connection attempt.
//!
//! Runs exactly once; a new attempt needs a new initiator.  The outcome is
//! reported to the state machine as either `connected` (socket ownership
//! moves to a session) or `connection_failed` (no socket remains open).

use std::sync::Arc;

use btlink_core::{close_quietly, Device, Socket};
use tracing::{debug, error, warn};

use super::{spawn_worker, CancelSlot, LinkFailure, WorkerId, WorkerRole};
use crate::application::link_service::{LinkError, LinkShared};

/// Handle held by the `Connecting` state.
pub(crate) struct InitiatorHandle {
    id: WorkerId,
    device: Device,
    socket: Arc<CancelSlot<dyn Socket>>,
}

impl InitiatorHandle {
    pub(crate) fn spawn(link: Arc<LinkShared>, id: WorkerId, device: Device) -> Result<Self, LinkError> {
        let socket: Arc<CancelSlot<dyn Socket>> = Arc::new(CancelSlot::empty());
        let slot = Arc::clone(&socket);
        let target = device.clone();
        spawn_worker(WorkerRole::Initiator, id, move || run(&link, id, &target, &slot))?;
        Ok(Self { id, device, socket })
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    /// Closes the socket if it exists, aborting a pending `connect()`.
    pub(crate) fn cancel(&self) {
        self.socket.cancel("connecting socket");
    }

    /// Releases the socket without closing it; it now belongs to a session.
    pub(crate) fn detach(&self) {
        self.socket.detach();
    }
}

fn run(link: &Arc<LinkShared>, id: WorkerId, device: &Device, slot: &CancelSlot<dyn Socket>) {
    link.before_connect(id, device);

    debug!(worker = %id, device = %device, "opening socket");
    let socket = match link.transport().create_socket(device, link.service()) {
        Ok(socket) => socket,
        Err(e) => {
            error!(worker = %id, device = %device, "failed to create socket: {e}");
            link.connection_failed(id, device, LinkFailure::SocketCreate(e));
            return;
        }
    };

    if !slot.install(Arc::clone(&socket)) {
        // Cancelled while the socket was being created; the state machine has
        // already moved on.
        debug!(worker = %id, device = %device, "attempt cancelled before connect");
        close_quietly(&*socket, "connecting socket");
        return;
    }

    debug!(worker = %id, device = %device, "connecting");
    match socket.connect() {
        Ok(()) => {
            debug!(worker = %id, device = %device, "connected");
            link.connected(id, socket);
        }
        Err(e) => {
            warn!(worker = %id, device = %device, "connect failed: {e}");
            slot.cancel("connecting socket");
            link.connection_failed(id, device, LinkFailure::Connect(e));
        }
    }
    debug!(worker = %id, "initiator exiting");
}
