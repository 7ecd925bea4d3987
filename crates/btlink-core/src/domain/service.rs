//! Service identity shared by listeners and connectors.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serial Port Profile UUID (`00001101-0000-1000-8000-00805F9B34FB`).
///
/// Assigned by the Bluetooth SIG for generic serial streams; a listener
/// advertising it is reachable by any SPP-capable connector.
pub const SERIAL_PORT_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

/// Human-readable name advertised in the service record by default.
pub const DEFAULT_SERVICE_NAME: &str = "Bluetooth Inspector";

/// A named service: what a listening endpoint is bound to and what an
/// outbound socket targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Name published alongside the UUID.
    pub name: String,
    /// 128-bit service identifier; listeners and connectors match on this.
    pub uuid: Uuid,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME, SERIAL_PORT_SERVICE_UUID)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}
