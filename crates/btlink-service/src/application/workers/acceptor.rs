//! Acceptor: waits for one inbound peer on a listening endpoint.
//!
//! The acceptor opens an endpoint for the configured service, blocks in
//! `accept()`, and hands the first accepted socket to the state machine.
//! Accepting one peer ends listening; the host calls `listen()` again to
//! accept another.  Open or accept failures are logged and end the worker
//! without retry.

use std::sync::Arc;

use btlink_core::{close_quietly, Endpoint};
use tracing::{debug, error};

use super::{spawn_worker, CancelSlot, LinkFailure, WorkerId, WorkerRole};
use crate::application::link_service::{LinkError, LinkShared};

/// Handle held by the `Listening` state.
pub(crate) struct AcceptorHandle {
    id: WorkerId,
    endpoint: Arc<CancelSlot<dyn Endpoint>>,
}

impl AcceptorHandle {
    pub(crate) fn spawn(link: Arc<LinkShared>, id: WorkerId) -> Result<Self, LinkError> {
        let endpoint: Arc<CancelSlot<dyn Endpoint>> = Arc::new(CancelSlot::empty());
        let slot = Arc::clone(&endpoint);
        spawn_worker(WorkerRole::Acceptor, id, move || run(&link, id, &slot))?;
        Ok(Self { id, endpoint })
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Closes the endpoint, unblocking a pending `accept()`.  Idempotent.
    pub(crate) fn cancel(&self) {
        self.endpoint.cancel("listening endpoint");
    }
}

fn run(link: &Arc<LinkShared>, id: WorkerId, slot: &CancelSlot<dyn Endpoint>) {
    debug!(worker = %id, "opening listening endpoint for {}", link.service());
    let endpoint = match link.transport().listen(link.service()) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!(worker = %id, "failed to open listening endpoint: {e}");
            link.acceptor_exited(id, Some(LinkFailure::TransportOpen(e)));
            return;
        }
    };

    if !slot.install(Arc::clone(&endpoint)) {
        debug!(worker = %id, "acceptor cancelled before endpoint was ready");
        close_quietly(&*endpoint, "listening endpoint");
        return;
    }

    let failure = accept_one(link, id, &*endpoint, slot);
    slot.cancel("listening endpoint");
    debug!(worker = %id, "acceptor exiting");
    link.acceptor_exited(id, failure);
}

/// Accepts a single peer.  Returns the failure to report, if any.
fn accept_one(
    link: &Arc<LinkShared>,
    id: WorkerId,
    endpoint: &dyn Endpoint,
    slot: &CancelSlot<dyn Endpoint>,
) -> Option<LinkFailure> {
    debug!(worker = %id, "waiting for inbound connection on {}", endpoint.service());
    let socket = match endpoint.accept() {
        Ok(socket) => socket,
        Err(e) if slot.is_cancelled() => {
            debug!(worker = %id, "accept interrupted by cancel: {e}");
            return None;
        }
        Err(e) => {
            error!(worker = %id, "accept failed: {e}");
            return Some(LinkFailure::Accept(e));
        }
    };

    let device = socket.remote_device();
    debug!(worker = %id, device = %device, "accepted remote connection");
    link.inbound_request_received(id, &device);

    // The state may have changed while the request was being announced; the
    // state machine re-checks under its lock and closes the socket if so.
    link.inbound_connection(id, socket);
    None
}
