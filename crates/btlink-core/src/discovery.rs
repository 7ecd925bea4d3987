//! Discovery contracts: the signals a scan produces and how to receive them.
//!
//! BtLink does not scan.  The platform runs the scan and broadcasts two kinds
//! of signal while it does: one per device seen, and one when the scan window
//! closes.  Consumers register a [`DiscoveryHandler`] with a
//! [`DiscoverySource`] to receive them.

use std::sync::Arc;

use crate::domain::device::Device;

/// A signal emitted by the platform while a scan is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySignal {
    /// A device was seen.  The same device may be reported several times.
    DeviceFound(Device),
    /// The scan window closed.  Carries no payload.
    ScanFinished,
}

/// What a handler wants after processing a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    /// Keep delivering signals.
    Continue,
    /// Remove this handler from the source; no further signals are delivered.
    Unsubscribe,
}

/// Identifies one registration with a [`DiscoverySource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Receiver side of the discovery signals.
pub trait DiscoveryHandler: Send + Sync {
    fn on_signal(&self, signal: &DiscoverySignal) -> HandlerFlow;
}

/// The platform's discovery broadcast mechanism.
///
/// Implementations must not hold internal locks while calling
/// [`DiscoveryHandler::on_signal`], since a handler may unsubscribe itself.
pub trait DiscoverySource: Send + Sync {
    /// Registers `handler` for both "device found" and "scan finished".
    fn subscribe(&self, handler: Arc<dyn DiscoveryHandler>) -> SubscriptionId;

    /// Removes a registration.  Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
