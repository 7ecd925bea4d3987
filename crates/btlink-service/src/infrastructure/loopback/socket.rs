//! In-memory socket with the blocking/close semantics of a radio socket.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use btlink_core::{Closable, Device, DeviceAddress, Socket};
use tracing::trace;
use uuid::Uuid;

use super::{ConnectBehavior, LoopbackEndpoint, RadioInner};
use crate::application::workers::lock;

#[derive(Default)]
struct SocketState {
    inbound: VecDeque<u8>,
    connected: bool,
    closed: bool,
    peer_closed: bool,
    peer: Option<Arc<LoopbackSocket>>,
}

/// One end of an in-memory duplex byte stream.
///
/// - `read` blocks until data arrives, the peer closes (`Ok(0)`), or this
///   end is closed (error).
/// - `connect` on an outbound socket blocks only when the radio is told to
///   let connects to the target hang; closing the socket releases it.
/// - `close` is idempotent and wakes every blocked call on this end.
pub struct LoopbackSocket {
    state: Mutex<SocketState>,
    ready: Condvar,
    local: Device,
    remote: Device,
    /// Where an outbound socket connects to; `None` for accepted sockets.
    target: Option<(DeviceAddress, Uuid)>,
    radio: Weak<RadioInner>,
    me: Weak<LoopbackSocket>,
}

impl LoopbackSocket {
    pub(super) fn outbound(radio: &Arc<RadioInner>, local: Device, remote: Device, service: Uuid) -> Arc<Self> {
        let target = Some((remote.address().clone(), service));
        Arc::new_cyclic(|me| Self {
            state: Mutex::new(SocketState::default()),
            ready: Condvar::new(),
            local,
            remote,
            target,
            radio: Arc::downgrade(radio),
            me: me.clone(),
        })
    }

    /// Creates the accepting side of a connection from `client`.
    pub(super) fn accepted(radio: &Arc<RadioInner>, client: &Arc<LoopbackSocket>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            state: Mutex::new(SocketState {
                connected: true,
                peer: Some(Arc::clone(client)),
                ..SocketState::default()
            }),
            ready: Condvar::new(),
            local: client.remote.clone(),
            remote: client.local.clone(),
            target: None,
            radio: Arc::downgrade(radio),
            me: me.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SocketState> {
        lock(&self.state)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SocketState>) -> MutexGuard<'a, SocketState> {
        self.ready
            .wait(guard)
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Marks this end as linked to `peer` and connected.
    fn attach(&self, peer: Arc<LoopbackSocket>) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(aborted("socket closed during connect"));
        }
        state.peer = Some(peer);
        state.connected = true;
        Ok(())
    }

    fn peer_gone(&self) {
        let mut state = self.lock();
        state.peer_closed = true;
        self.ready.notify_all();
    }

    fn deliver(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"));
        }
        state.inbound.extend(data);
        self.ready.notify_all();
        Ok(())
    }

    /// Creates the accepting side, links it to this socket and queues it on
    /// `endpoint`.  If this socket was closed meanwhile, or the endpoint
    /// closed between lookup and hand-off, both sides are closed.
    fn hand_off(&self, radio: &Arc<RadioInner>, endpoint: &LoopbackEndpoint) -> io::Result<()> {
        let client = self.me.upgrade().ok_or_else(|| aborted("socket dropped during connect"))?;
        let server = LoopbackSocket::accepted(radio, &client);
        radio.track(Arc::clone(&server));
        let linked = self
            .attach(Arc::clone(&server))
            .and_then(|()| endpoint.offer(Arc::clone(&server)));
        if let Err(e) = linked {
            let _ = server.close();
            let _ = self.close();
            return Err(e);
        }
        Ok(())
    }

    fn block_until_closed(&self) -> io::Error {
        let mut state = self.lock();
        while !state.closed {
            state = self.wait(state);
        }
        aborted("connect aborted by close")
    }
}

fn aborted(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, message.to_string())
}

impl Closable for LoopbackSocket {
    fn close(&self) -> io::Result<()> {
        let peer = {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            self.ready.notify_all();
            state.peer.take()
        };
        trace!(local = %self.local, remote = %self.remote, "loopback socket closed");
        if let Some(peer) = peer {
            peer.peer_gone();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Socket for LoopbackSocket {
    fn remote_device(&self) -> Device {
        self.remote.clone()
    }

    fn connect(&self) -> io::Result<()> {
        {
            let state = self.lock();
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
            }
            if state.connected {
                return Err(io::Error::new(io::ErrorKind::Other, "already connected"));
            }
        }
        let Some((address, service)) = self.target.clone() else {
            return Err(io::Error::new(io::ErrorKind::Other, "accepted sockets cannot connect"));
        };
        let radio = self
            .radio
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "radio switched off"))?;

        match radio.connect_behavior(&address) {
            ConnectBehavior::Accept | ConnectBehavior::FailCreate(_) => {}
            ConnectBehavior::Refuse(kind) => {
                return Err(io::Error::new(kind, format!("{address} refused the connection")));
            }
            ConnectBehavior::Hang => return Err(self.block_until_closed()),
        }

        let endpoint = radio
            .listener(&address, service)
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, format!("{address} is not listening")))?;

        self.hand_off(&radio, &endpoint)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(aborted("socket closed"));
            }
            if !state.connected {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "socket not connected"));
            }
            if !state.inbound.is_empty() {
                let n = buf.len().min(state.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if state.peer_closed {
                return Ok(0);
            }
            state = self.wait(state);
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let peer = {
            let state = self.lock();
            if state.closed {
                return Err(aborted("socket closed"));
            }
            if !state.connected {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "socket not connected"));
            }
            if state.peer_closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"));
            }
            state.peer.clone()
        };
        match peer {
            Some(peer) => {
                peer.deliver(buf)?;
                Ok(buf.len())
            }
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::loopback::LoopbackRadio;
    use btlink_core::{ServiceRecord, Transport};

    fn device(addr: &str) -> Device {
        Device::unbonded(DeviceAddress::parse(addr).unwrap())
    }

    /// A client closed after the listener lookup must not leave the freshly
    /// created server side open.
    #[test]
    fn test_hand_off_after_client_close_closes_server_side() {
        // Arrange
        let radio = LoopbackRadio::new();
        let target = radio.adapter(device("AA"));
        let record = ServiceRecord::default();
        let _listening = target.listen(&record).unwrap();
        let endpoint = radio.inner.listener(target.local_device().address(), record.uuid).unwrap();
        let client = LoopbackSocket::outbound(&radio.inner, device("BB"), device("AA"), record.uuid);
        radio.inner.track(Arc::clone(&client));
        client.close().unwrap();

        // Act
        let result = client.hand_off(&radio.inner, &endpoint);

        // Assert
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(radio.open_sockets(), 0);
    }
}
