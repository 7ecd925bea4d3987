//! Application layer for the link service.
//!
//! Everything here is written against the `btlink_core` traits (`Transport`,
//! `Socket`, `DiscoverySource`) and never against a concrete radio stack, so
//! the whole state machine runs unchanged on the in-memory loopback radio.
//!
//! # Sub-modules
//!
//! - **`link_service`** – The connection state machine.  Owns the current
//!   state and the at-most-one worker backing it; serializes every
//!   transition under a single lock.
//!
//! - **`listener`** – The notification interface the host injects at
//!   construction, plus a channel-forwarding implementation.
//!
//! - **`workers`** – The three blocking roles (acceptor, initiator, session),
//!   each on its own named thread.
//!
//! - **`discovery`** – Collects unbonded devices over one scan window and
//!   delivers the set exactly once.

pub mod discovery;
pub mod link_service;
pub mod listener;
pub mod workers;
