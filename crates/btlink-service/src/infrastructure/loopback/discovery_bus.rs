//! In-process discovery broadcast.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use btlink_core::{DiscoveryHandler, DiscoverySignal, DiscoverySource, HandlerFlow, SubscriptionId};
use tracing::trace;

use crate::application::workers::lock;

#[derive(Default)]
struct BusState {
    last_id: u64,
    handlers: BTreeMap<SubscriptionId, Arc<dyn DiscoveryHandler>>,
}

/// A [`DiscoverySource`] that delivers signals synchronously on the
/// publishing thread, in subscription order.
#[derive(Default)]
pub struct DiscoveryBus {
    state: Mutex<BusState>,
}

struct FnHandler<F>(F);

impl<F> DiscoveryHandler for FnHandler<F>
where
    F: Fn(&DiscoverySignal) -> HandlerFlow + Send + Sync,
{
    fn on_signal(&self, signal: &DiscoverySignal) -> HandlerFlow {
        (self.0)(signal)
    }
}

impl DiscoveryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a closure.
    pub fn subscribe_fn<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DiscoverySignal) -> HandlerFlow + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnHandler(handler)))
    }

    /// Delivers `signal` to every current subscriber.
    ///
    /// Handlers run without the bus lock held, so they may subscribe or
    /// unsubscribe.  A handler returning [`HandlerFlow::Unsubscribe`] is
    /// removed before the next signal.
    pub fn publish(&self, signal: &DiscoverySignal) {
        let handlers: Vec<(SubscriptionId, Arc<dyn DiscoveryHandler>)> = lock(&self.state)
            .handlers
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();
        trace!("publishing {signal:?} to {} handler(s)", handlers.len());
        for (id, handler) in handlers {
            if handler.on_signal(signal) == HandlerFlow::Unsubscribe {
                self.unsubscribe(id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).handlers.len()
    }
}

impl DiscoverySource for DiscoveryBus {
    fn subscribe(&self, handler: Arc<dyn DiscoveryHandler>) -> SubscriptionId {
        let mut state = lock(&self.state);
        state.last_id += 1;
        let id = SubscriptionId(state.last_id);
        state.handlers.insert(id, handler);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.state).handlers.remove(&id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
