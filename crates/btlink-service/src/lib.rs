//! btlink-service library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does btlink-service do? (for beginners)
//!
//! It runs the lifecycle of one logical point-to-point link:
//!
//! 1. `listen()` starts an *acceptor* thread that waits for one inbound peer.
//! 2. `connect(device)` starts an *initiator* thread that dials one peer.
//! 3. Whichever succeeds hands its connected socket to a *session* thread,
//!    which runs the host's data pump until the socket closes.
//! 4. `reset()` / `stop()` tear everything down by closing the underlying
//!    transport resources.
//!
//! Separately, the discovery aggregator collects unbonded devices seen during
//! one scan and hands the final set to the host.

/// Application layer: the state machine, its workers, and discovery.
pub mod application;

/// Infrastructure layer: in-memory transport and configuration storage.
pub mod infrastructure;

pub use application::discovery::{DiscoveredSet, DiscoveryAggregator, ScanRegistration};
pub use application::link_service::{LinkConfig, LinkError, LinkService};
pub use application::listener::{ChannelListener, LinkEvent, LinkListener, NoopListener};
pub use application::workers::{LinkFailure, SessionPump, WorkerId};
