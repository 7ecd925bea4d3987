//! Session: runs the host's data pump over one connected socket.
//!
//! Whatever way the pump ends (finished exchange, I/O error, socket closed by
//! `cancel()`, even a panic in host code) the session closes the socket
//! exactly once and then reports that it ended.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use btlink_core::{Device, Socket, SocketHandle};
use tracing::{debug, error};

use super::{spawn_worker, CancelSlot, WorkerId, WorkerRole};
use crate::application::link_service::{LinkError, LinkShared};

/// Handle held by the `Connected` state.
pub(crate) struct SessionHandle {
    id: WorkerId,
    device: Device,
    socket: Arc<CancelSlot<dyn Socket>>,
}

impl SessionHandle {
    pub(crate) fn spawn(
        link: Arc<LinkShared>,
        id: WorkerId,
        device: Device,
        socket: SocketHandle,
    ) -> Result<Self, LinkError> {
        let slot: Arc<CancelSlot<dyn Socket>> = Arc::new(CancelSlot::holding(Arc::clone(&socket)));
        let worker_slot = Arc::clone(&slot);
        let peer = device.clone();
        spawn_worker(WorkerRole::Session, id, move || run(&link, id, &peer, socket, &worker_slot))?;
        Ok(Self {
            id,
            device,
            socket: slot,
        })
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    /// Closes the socket, which interrupts a blocking read or write in the pump.
    pub(crate) fn cancel(&self) {
        self.socket.cancel("session socket");
    }
}

fn run(
    link: &Arc<LinkShared>,
    id: WorkerId,
    device: &Device,
    socket: SocketHandle,
    slot: &CancelSlot<dyn Socket>,
) {
    debug!(worker = %id, device = %device, "session started");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| link.pump().pump(&*socket)));
    if outcome.is_err() {
        error!(worker = %id, device = %device, "session pump panicked");
    }
    slot.cancel("session socket");
    drop(socket);
    debug!(worker = %id, device = %device, "session finished");
    link.session_ended(id, device);
}
