//! Notification interface injected into the [`LinkService`] at construction.
//!
//! Every method has an empty default, so a host only overrides the
//! notifications it cares about.
//!
//! # Threading rules
//!
//! Callbacks are invoked while the link's state lock is held, from whichever
//! thread triggered the transition (a worker thread or the caller of a public
//! method).  Two consequences:
//!
//! - Callbacks are totally ordered with respect to every state transition.
//! - A callback must **not** call back into the `LinkService` (that would
//!   deadlock) and should return quickly.  Hosts that need to react, e.g. by
//!   calling `reset()` after a session ends, use [`ChannelListener`] and act on
//!   the events from their own control thread.
//!
//! [`LinkService`]: crate::application::link_service::LinkService

use btlink_core::{Device, LinkStatus};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::workers::LinkFailure;

/// Host-side notification points of the link state machine.
pub trait LinkListener: Send + Sync {
    /// The link moved from `old` to `new`.
    fn on_state_changed(&self, _old: &LinkStatus, _new: &LinkStatus) {}

    /// An initiator is about to open a socket to `device`.
    fn on_before_connect(&self, _device: &Device) {}

    /// An outbound connection to `device` succeeded and its session started.
    fn on_connected(&self, _device: &Device) {}

    /// An outbound connection to `device` failed.  The link has already been
    /// reset to idle when this fires.
    fn on_connection_failed(&self, _device: &Device, _failure: &LinkFailure) {}

    /// The acceptor received an inbound connection from `device`.  Fires
    /// before the link decides whether to keep the connection.
    fn on_inbound_connection_request_received(&self, _device: &Device) {}

    /// An inbound connection from `device` was kept and its session started.
    fn on_inbound_connection(&self, _device: &Device) {}

    /// The acceptor could not open its endpoint or `accept()` failed.  The
    /// link has returned to idle; call `listen()` again to retry.
    fn on_listen_failed(&self, _failure: &LinkFailure) {}

    /// The current session's pump routine returned and its socket is closed.
    /// The link stays connected until the host calls `reset()`.
    fn on_session_ended(&self, _device: &Device) {}
}

/// A listener that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl LinkListener for NoopListener {}

/// Owned form of every [`LinkListener`] notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    StateChanged { old: LinkStatus, new: LinkStatus },
    BeforeConnect { device: Device },
    Connected { device: Device },
    ConnectionFailed { device: Device, reason: String },
    InboundConnectionRequestReceived { device: Device },
    InboundConnection { device: Device },
    ListenFailed { reason: String },
    SessionEnded { device: Device },
}

/// Forwards every notification as a [`LinkEvent`] on a bounded channel.
///
/// Sending never blocks: the callback runs under the state lock, so when the
/// channel is full the event is dropped and a warning is logged.
pub struct ChannelListener {
    tx: mpsc::Sender<LinkEvent>,
}

impl ChannelListener {
    /// Creates the listener together with the receiver the host drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn emit(&self, event: LinkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("link event channel full; dropping {event:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("link event receiver dropped");
            }
        }
    }
}

impl LinkListener for ChannelListener {
    fn on_state_changed(&self, old: &LinkStatus, new: &LinkStatus) {
        self.emit(LinkEvent::StateChanged {
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn on_before_connect(&self, device: &Device) {
        self.emit(LinkEvent::BeforeConnect {
            device: device.clone(),
        });
    }

    fn on_connected(&self, device: &Device) {
        self.emit(LinkEvent::Connected {
            device: device.clone(),
        });
    }

    fn on_connection_failed(&self, device: &Device, failure: &LinkFailure) {
        self.emit(LinkEvent::ConnectionFailed {
            device: device.clone(),
            reason: failure.to_string(),
        });
    }

    fn on_inbound_connection_request_received(&self, device: &Device) {
        self.emit(LinkEvent::InboundConnectionRequestReceived {
            device: device.clone(),
        });
    }

    fn on_inbound_connection(&self, device: &Device) {
        self.emit(LinkEvent::InboundConnection {
            device: device.clone(),
        });
    }

    fn on_listen_failed(&self, failure: &LinkFailure) {
        self.emit(LinkEvent::ListenFailed {
            reason: failure.to_string(),
        });
    }

    fn on_session_ended(&self, device: &Device) {
        self.emit(LinkEvent::SessionEnded {
            device: device.clone(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
