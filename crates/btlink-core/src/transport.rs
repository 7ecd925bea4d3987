//! Transport abstraction: the socket-like capability set the radio stack provides.
//!
//! BtLink never talks to a radio directly.  The platform supplies a
//! [`Transport`] that can open listening [`Endpoint`]s and create outbound
//! [`Socket`]s; everything else in the system is written against these traits.
//!
//! # The cancellation contract (for beginners)
//!
//! `accept`, `connect`, `read` and `write` are *blocking* calls.  A thread
//! stuck in one of them cannot be interrupted by setting a flag, because it
//! never looks at the flag.  Instead every implementation must guarantee:
//!
//! > Closing an `Endpoint` or `Socket` makes any call currently blocked on it
//! > return promptly with an error.
//!
//! That single rule is the only cancellation mechanism in BtLink: no polling,
//! no timeouts, no killing threads.  `close` must also be idempotent, so a
//! resource that is closed twice (once by a canceller, once on normal
//! teardown) reports success both times.

use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::device::Device;
use crate::domain::service::ServiceRecord;

/// Anything that can be closed to release it and unblock its pending calls.
pub trait Closable: Send + Sync {
    /// Closes the resource.  Calling this more than once is a no-op.
    fn close(&self) -> io::Result<()>;

    /// Returns `true` once [`close`](Closable::close) has been called.
    fn is_closed(&self) -> bool;
}

/// A connected (or, before `connect`, connectable) duplex byte stream.
///
/// All methods take `&self` so one thread can block in `read`/`connect`
/// while another thread calls `close` to interrupt it.
pub trait Socket: Closable {
    /// The peer at the other end.
    fn remote_device(&self) -> Device;

    /// Completes the outbound connection.  Blocks until the peer answers,
    /// the attempt fails, or the socket is closed.
    fn connect(&self) -> io::Result<()>;

    /// Reads into `buf`.  `Ok(0)` means the peer closed its side.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes from `buf`, returning how many bytes were accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
}

/// A bound listening resource that produces connected sockets.
pub trait Endpoint: Closable {
    /// The service record this endpoint was opened for.
    fn service(&self) -> &ServiceRecord;

    /// Blocks until a peer connects or the endpoint is closed.
    fn accept(&self) -> io::Result<SocketHandle>;
}

/// Shared handle to a socket; cloned between the owner and its canceller.
pub type SocketHandle = Arc<dyn Socket>;

/// Shared handle to a listening endpoint.
pub type EndpointHandle = Arc<dyn Endpoint>;

/// Factory for transport resources, implemented by the platform adapter.
pub trait Transport: Send + Sync {
    /// Opens a listening endpoint advertising `service`.
    fn listen(&self, service: &ServiceRecord) -> io::Result<EndpointHandle>;

    /// Creates an unconnected socket targeting `service` on `device`.
    /// The caller must invoke [`Socket::connect`] to complete the connection.
    fn create_socket(&self, device: &Device, service: &ServiceRecord) -> io::Result<SocketHandle>;
}

/// Closes `resource`, logging and swallowing any error.
///
/// Used on every teardown path: a resource that is being discarded anyway
/// must never turn a close failure into an operation failure.
pub fn close_quietly<R: Closable + ?Sized>(resource: &R, what: &str) {
    if resource.is_closed() {
        return;
    }
    debug!("closing {what}");
    if let Err(e) = resource.close() {
        error!("failed to close {what}: {e}");
    }
}

/// `std::io` adapter over a borrowed socket.
///
/// Lets a pump routine wrap the socket in `BufReader`, use `read_exact`,
/// `write_all`, and so on.
pub struct SocketStream<'a> {
    socket: &'a dyn Socket,
}

impl<'a> SocketStream<'a> {
    pub fn new(socket: &'a dyn Socket) -> Self {
        Self { socket }
    }
}

impl Read for SocketStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}

impl Write for SocketStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
