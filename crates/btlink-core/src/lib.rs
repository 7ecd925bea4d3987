//! # btlink-core
//!
//! Shared library for BtLink containing the domain entities, the transport
//! abstraction, and the discovery contracts.
//!
//! It has zero dependencies on OS APIs, threads, or radio stacks.  The
//! `btlink-service` crate builds the connection state machine on top of it.
//!
//! # Architecture overview (for beginners)
//!
//! BtLink manages a single point-to-point wireless link over a socket-like
//! transport (for example Bluetooth RFCOMM).  A host application asks it to
//! either *listen* for one inbound peer or *connect* to one outbound peer, and
//! once the link is up it hands the connected socket to the host's data pump.
//!
//! This crate defines the vocabulary shared by every layer:
//!
//! - **`domain`** – Who the peers are (`Device`, `BondState`), which service
//!   they talk on (`ServiceRecord`), and what the link is doing right now
//!   (`LinkStatus`).
//!
//! - **`transport`** – The capability set the platform radio stack provides:
//!   listen, accept, connect, read, write, close.  Closing a resource is the
//!   one and only way to interrupt a blocked call on it.
//!
//! - **`discovery`** – The signals a scan produces ("device found", "scan
//!   finished") and the subscribe/unsubscribe contract for receiving them.

pub mod discovery;
pub mod domain;
pub mod transport;

pub use discovery::{DiscoveryHandler, DiscoverySignal, DiscoverySource, HandlerFlow, SubscriptionId};
pub use domain::device::{AddressError, BondState, Device, DeviceAddress};
pub use domain::service::{ServiceRecord, DEFAULT_SERVICE_NAME, SERIAL_PORT_SERVICE_UUID};
pub use domain::status::LinkStatus;
pub use transport::{
    close_quietly, Closable, Endpoint, EndpointHandle, Socket, SocketHandle, SocketStream,
    Transport,
};
