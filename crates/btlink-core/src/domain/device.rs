//! Remote peer identity and bonding status.
//!
//! A [`Device`] is produced by the platform (discovery results, the remote end
//! of an accepted socket) and is immutable afterwards.  Two `Device` values are
//! the same peer when their addresses match, regardless of the bond state that
//! was observed at the time each value was created.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a device address string is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("device address must not be empty")]
    Empty,
}

/// Opaque peer address, e.g. `"00:11:22:AA:BB:CC"` on Bluetooth.
///
/// The core never interprets the contents; it only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Wraps a non-empty address string.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Empty`] for an empty or all-whitespace string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AddressError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether a persistent trust relationship exists with a peer.
///
/// Establishing a bond is outside BtLink's scope; the state is only queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondState {
    Bonded,
    NotBonded,
}

/// A remote peer as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    address: DeviceAddress,
    bond_state: BondState,
}

impl Device {
    pub fn new(address: DeviceAddress, bond_state: BondState) -> Self {
        Self {
            address,
            bond_state,
        }
    }

    /// Convenience constructor for a peer with no existing bond.
    pub fn unbonded(address: DeviceAddress) -> Self {
        Self::new(address, BondState::NotBonded)
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// The bonding query: the bond state observed when this value was produced.
    pub fn bond_state(&self) -> BondState {
        self.bond_state
    }

    pub fn is_bonded(&self) -> bool {
        self.bond_state == BondState::Bonded
    }
}

// Equality and hashing go through the address only, so a set of devices
// collapses repeated sightings of the same peer.
impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
