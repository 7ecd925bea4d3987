//! The three blocking worker roles and the plumbing they share.
//!
//! Each worker runs on its own named OS thread and owns exactly one closable
//! transport resource:
//!
//! | Worker      | Resource            | Blocking call        |
//! |-------------|---------------------|----------------------|
//! | `acceptor`  | listening endpoint  | `Endpoint::accept`   |
//! | `initiator` | outbound socket     | `Socket::connect`    |
//! | `session`   | connected socket    | `Socket::read/write` |
//!
//! # How cancellation works (for beginners)
//!
//! A worker stuck in a blocking call cannot see a "please stop" flag.  So the
//! resource it is blocked on lives in a [`CancelSlot`] shared with the state
//! machine.  Cancelling closes whatever is in the slot, which (by the
//! transport contract) makes the blocked call return with an error.  If the
//! worker has not created its resource yet, the slot remembers the
//! cancellation and closes the resource the moment the worker installs it.
//!
//! Blocking calls are never made while holding the slot's lock or the link's
//! state lock.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use btlink_core::{close_quietly, Closable, Socket};
use thiserror::Error;

use crate::application::link_service::LinkError;

pub mod acceptor;
pub mod initiator;
pub mod session;

/// Identifies one worker instance.
///
/// Ids are allocated from a per-service counter and never reused, so a
/// callback from a superseded worker can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role a worker thread plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Acceptor,
    Initiator,
    Session,
}

impl WorkerRole {
    fn thread_name(self) -> &'static str {
        match self {
            WorkerRole::Acceptor => "btlink-acceptor",
            WorkerRole::Initiator => "btlink-initiator",
            WorkerRole::Session => "btlink-session",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerRole::Acceptor => "acceptor",
            WorkerRole::Initiator => "initiator",
            WorkerRole::Session => "session",
        })
    }
}

/// Failures a worker hits on the transport.
///
/// Never returned from a public method: workers log them and report them
/// through the listener (`on_listen_failed`, `on_connection_failed`).
#[derive(Debug, Error)]
pub enum LinkFailure {
    /// The listening endpoint could not be opened.
    #[error("failed to open listening endpoint: {0}")]
    TransportOpen(#[source] io::Error),
    /// `accept()` returned an error that was not caused by cancellation.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    /// The outbound socket could not be created.
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),
    /// `connect()` returned an error.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    /// The session thread for a fresh connection could not be started.
    #[error("failed to start session thread: {0}")]
    Spawn(#[source] io::Error),
}

/// The host's data pump, run by the session worker.
///
/// Returns when the exchange is finished or the socket reports an error.
/// A read or write failing because the socket was closed from outside is the
/// normal way a pump is told to stop.
pub trait SessionPump: Send + Sync + 'static {
    fn pump(&self, socket: &dyn Socket);
}

impl<F> SessionPump for F
where
    F: Fn(&dyn Socket) + Send + Sync + 'static,
{
    fn pump(&self, socket: &dyn Socket) {
        self(socket)
    }
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SlotState<T: ?Sized> {
    resource: Option<Arc<T>>,
    cancelled: bool,
}

/// Holds a worker's closable resource so another thread can close it.
pub(crate) struct CancelSlot<T: ?Sized> {
    state: Mutex<SlotState<T>>,
}

impl<T: Closable + ?Sized> CancelSlot<T> {
    pub(crate) fn empty() -> Self {
        Self {
            state: Mutex::new(SlotState {
                resource: None,
                cancelled: false,
            }),
        }
    }

    pub(crate) fn holding(resource: Arc<T>) -> Self {
        Self {
            state: Mutex::new(SlotState {
                resource: Some(resource),
                cancelled: false,
            }),
        }
    }

    /// Stores `resource` so that a later [`cancel`](Self::cancel) closes it.
    ///
    /// Returns `false` if the slot was already cancelled; the caller still
    /// owns the resource and must close it.
    pub(crate) fn install(&self, resource: Arc<T>) -> bool {
        let mut state = lock(&self.state);
        if state.cancelled {
            return false;
        }
        state.resource = Some(resource);
        true
    }

    /// Marks the slot cancelled and closes the held resource, if any.
    /// Safe to call repeatedly and from any thread.
    pub(crate) fn cancel(&self, what: &str) {
        let resource = {
            let mut state = lock(&self.state);
            state.cancelled = true;
            state.resource.take()
        };
        if let Some(resource) = resource {
            close_quietly(&*resource, what);
        }
    }

    /// Marks the slot cancelled and removes the resource *without* closing
    /// it; ownership moves to the caller.
    pub(crate) fn detach(&self) -> Option<Arc<T>> {
        let mut state = lock(&self.state);
        state.cancelled = true;
        state.resource.take()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }
}

/// Spawns a detached, named worker thread.
///
/// Workers are never joined: they finish on their own once their resource is
/// closed, and joining under the state lock could deadlock.
pub(crate) fn spawn_worker<F>(role: WorkerRole, id: WorkerId, body: F) -> Result<(), LinkError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}-{}", role.thread_name(), id.0))
        .spawn(body)
        .map(drop)
        .map_err(|source| LinkError::Spawn { role, source })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
