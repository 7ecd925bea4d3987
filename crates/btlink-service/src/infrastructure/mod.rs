//! Infrastructure layer for the link service.
//!
//! Contains the adapters that sit outside the state machine: the in-process
//! loopback radio used by the demo binary and the tests, and file-system
//! storage for the configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `btlink_core`, but MUST NOT be imported by the `application` layer.

pub mod loopback;
pub mod storage;
