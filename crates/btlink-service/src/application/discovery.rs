//! Discovery aggregator: collects the unbonded devices seen during one scan.
//!
//! # Lifecycle
//!
//! ```text
//! register(source, on_finished)
//!   │  subscribes to "device found" and "scan finished"
//!   ▼
//! Collecting ── DeviceFound(d), d not bonded ──► add d (duplicates collapse)
//!   │
//!   ├── ScanFinished ──► on_finished(set) exactly once, then unsubscribe
//!   │
//!   └── unregister() / drop ──► partial set discarded, nothing delivered
//! ```
//!
//! Bonded devices are skipped: the host already knows about them and only
//! wants candidates it could pair with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use btlink_core::{
    Device, DeviceAddress, DiscoveryHandler, DiscoverySignal, DiscoverySource, HandlerFlow,
    SubscriptionId,
};
use tracing::{debug, info};

use crate::application::workers::lock;

/// Devices found during one scan window, keyed by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredSet {
    devices: HashMap<DeviceAddress, Device>,
}

impl DiscoveredSet {
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.devices.contains_key(address)
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<&Device> {
        self.devices.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Consumes the set, returning the devices ordered by address.
    pub fn into_devices(self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.into_values().collect();
        devices.sort_by(|a, b| a.address().cmp(b.address()));
        devices
    }

    /// Adds `device` unless a device with the same address is present.
    /// Returns `true` if it was added.
    fn insert(&mut self, device: Device) -> bool {
        if self.devices.contains_key(device.address()) {
            return false;
        }
        self.devices.insert(device.address().clone(), device);
        true
    }
}

/// Callback receiving the final set when the scan finishes.
pub type ScanFinishedCallback = Box<dyn FnOnce(DiscoveredSet) + Send>;

enum ScanPhase {
    Collecting {
        devices: DiscoveredSet,
        on_finished: ScanFinishedCallback,
    },
    Done,
}

/// Accumulates one scan's unbonded devices.
///
/// Created through [`DiscoveryAggregator::register`]; the returned
/// [`ScanRegistration`] controls its lifetime.
pub struct DiscoveryAggregator {
    phase: Mutex<ScanPhase>,
}

impl DiscoveryAggregator {
    /// Subscribes a fresh aggregator to `source`.
    ///
    /// `on_finished` runs exactly once, on the thread that delivers the
    /// "scan finished" signal, unless the registration is dropped first.
    pub fn register<F>(source: Arc<dyn DiscoverySource>, on_finished: F) -> ScanRegistration
    where
        F: FnOnce(DiscoveredSet) + Send + 'static,
    {
        let aggregator = Arc::new(Self {
            phase: Mutex::new(ScanPhase::Collecting {
                devices: DiscoveredSet::default(),
                on_finished: Box::new(on_finished),
            }),
        });
        let id = source.subscribe(Arc::clone(&aggregator) as Arc<dyn DiscoveryHandler>);
        debug!(subscription = id.0, "discovery aggregator registered");
        ScanRegistration {
            source,
            id,
            aggregator,
            released: false,
        }
    }

    fn is_collecting(&self) -> bool {
        matches!(*lock(&self.phase), ScanPhase::Collecting { .. })
    }

    /// Drops the partial set without delivering it.
    fn discard(&self) {
        *lock(&self.phase) = ScanPhase::Done;
    }
}

impl DiscoveryHandler for DiscoveryAggregator {
    fn on_signal(&self, signal: &DiscoverySignal) -> HandlerFlow {
        match signal {
            DiscoverySignal::DeviceFound(device) => {
                let mut phase = lock(&self.phase);
                let ScanPhase::Collecting { devices, .. } = &mut *phase else {
                    return HandlerFlow::Unsubscribe;
                };
                if device.is_bonded() {
                    debug!(device = %device, "skipping bonded device");
                } else if devices.insert(device.clone()) {
                    debug!(device = %device, "discovered unbonded device");
                }
                HandlerFlow::Continue
            }
            DiscoverySignal::ScanFinished => {
                let finished = std::mem::replace(&mut *lock(&self.phase), ScanPhase::Done);
                if let ScanPhase::Collecting {
                    devices,
                    on_finished,
                } = finished
                {
                    info!("scan finished with {} unbonded device(s)", devices.len());
                    on_finished(devices);
                }
                HandlerFlow::Unsubscribe
            }
        }
    }
}

/// Keeps an aggregator subscribed.  Dropping it unregisters.
pub struct ScanRegistration {
    source: Arc<dyn DiscoverySource>,
    id: SubscriptionId,
    aggregator: Arc<DiscoveryAggregator>,
    released: bool,
}

impl ScanRegistration {
    /// Whether the scan is still being collected (not finished, not
    /// unregistered).
    pub fn is_active(&self) -> bool {
        !self.released && self.aggregator.is_collecting()
    }

    /// Unsubscribes early, silently discarding any partial result.
    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.aggregator.is_collecting() {
            debug!(subscription = self.id.0, "discovery aggregator unregistered before scan finished");
        }
        self.aggregator.discard();
        self.source.unsubscribe(self.id);
    }
}

impl Drop for ScanRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
