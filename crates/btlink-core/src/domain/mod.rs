//! Domain entities for BtLink.
//!
//! This module contains plain data with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! - **`device`** – A remote peer as reported by the platform: an opaque
//!   address plus whether a persistent trust relationship (a *bond*) already
//!   exists with it.
//! - **`service`** – The named service a listener advertises and a connector
//!   targets.  Both sides must agree on the 128-bit service UUID.
//! - **`status`** – The observable state of the single logical link.

pub mod device;
pub mod service;
pub mod status;
