//! Observable state of the link.
//!
//! # Link lifecycle (for beginners)
//!
//! ```text
//! Idle ── listen() ──► Listening ── peer accepted ──► Connected
//!  │                       │                              ▲
//!  │                       └── accept fails ──► Idle      │
//!  └── connect(d) ──► Connecting ── connect succeeds ─────┘
//!                          └── connect fails ──► Idle
//!
//! reset() / stop() from any state ──► Idle
//! connect(d) from any state       ──► Connecting
//! ```
//!
//! The service crate holds the worker that backs each state inside the state
//! itself, so e.g. "Connected with no session" cannot be represented.  This
//! enum is the read-only projection handed to hosts and listeners.

use std::fmt;

use crate::domain::device::Device;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// No worker is running.
    Idle,
    /// An acceptor owns an open listening endpoint.
    Listening,
    /// An initiator is attempting an outbound connection.
    Connecting { device: Device },
    /// A session owns the connected socket.
    Connected { device: Device },
}

impl LinkStatus {
    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Idle => "idle",
            LinkStatus::Listening => "listening",
            LinkStatus::Connecting { .. } => "connecting",
            LinkStatus::Connected { .. } => "connected",
        }
    }

    /// The peer this state is about, if any.
    pub fn device(&self) -> Option<&Device> {
        match self {
            LinkStatus::Connecting { device } | LinkStatus::Connected { device } => Some(device),
            LinkStatus::Idle | LinkStatus::Listening => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device() {
            Some(device) => write!(f, "{}({device})", self.label()),
            None => f.write_str(self.label()),
        }
    }
}
