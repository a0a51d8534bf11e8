// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Datagram transports: UDP for real hosts, crossbeam channels in-process.

use std::net::SocketAddr;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::error::{EdclError, Result};

// ---------------------------------------------------------------------------
// Transport address
// ---------------------------------------------------------------------------

/// Remote peer of a datagram. Stored with each pending operation so the
/// response goes back where the request came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportAddr {
    /// UDP socket address.
    Udp(SocketAddr),
    /// In-process channel endpoint id.
    Local(u16),
}

impl std::fmt::Display for TransportAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportAddr::Udp(sa) => write!(f, "udp://{}", sa),
            TransportAddr::Local(id) => write!(f, "local://{}", id),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Raw datagram transport.
pub trait EdclTransport: Send {
    /// Receive one datagram into `buf`.
    ///
    /// Blocks for at most the transport's poll interval. `Ok(None)` means
    /// nothing arrived; `Err(EdclError::TransportClosed)` means nothing ever will.
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, TransportAddr)>>;

    /// Send one datagram to `addr`.
    fn send(&mut self, addr: &TransportAddr, data: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// UDP transport
// ---------------------------------------------------------------------------

/// UDP transport using `socket2`.
pub struct UdpTransport {
    socket: socket2::Socket,
}

impl UdpTransport {
    /// Bind to `addr`. Receives time out after `poll_interval` so the owning
    /// loop can notice shutdown.
    pub fn bind(addr: SocketAddr, poll_interval: Duration) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };
        let socket = socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_read_timeout(Some(poll_interval))?;
        Ok(Self { socket })
    }

    /// Bind to `0.0.0.0:<port>`.
    pub fn bind_port(port: u16, poll_interval: Duration) -> Result<Self> {
        Self::bind(([0, 0, 0, 0], port).into(), poll_interval)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| EdclError::Io(std::io::Error::other("socket has no inet address")))
    }
}

impl EdclTransport for UdpTransport {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, TransportAddr)>> {
        let buf_ref = unsafe {
            // socket2 wants a MaybeUninit slice; ours is initialized.
            &mut *(buf as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
        };
        match self.socket.recv_from(buf_ref) {
            Ok((n, addr)) => {
                let peer = addr
                    .as_socket()
                    .ok_or_else(|| EdclError::Io(std::io::Error::other("invalid peer address")))?;
                Ok(Some((n, TransportAddr::Udp(peer))))
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn send(&mut self, addr: &TransportAddr, data: &[u8]) -> Result<()> {
        match addr {
            TransportAddr::Udp(sa) => {
                let sa2: socket2::SockAddr = (*sa).into();
                self.socket.send_to(data, &sa2)?;
                Ok(())
            }
            TransportAddr::Local(_) => Err(EdclError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "UDP transport requires UDP address",
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel transport
// ---------------------------------------------------------------------------

/// One end of an in-process datagram pipe.
pub struct ChannelTransport {
    id: u16,
    peer: u16,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    timeout: Duration,
}

impl ChannelTransport {
    /// Two connected ends. Ids are `Local(0)` and `Local(1)`.
    pub fn pair(timeout: Duration) -> (Self, Self) {
        let (a_tx, b_rx) = channel::unbounded();
        let (b_tx, a_rx) = channel::unbounded();
        let a = Self {
            id: 0,
            peer: 1,
            tx: a_tx,
            rx: a_rx,
            timeout,
        };
        let b = Self {
            id: 1,
            peer: 0,
            tx: b_tx,
            rx: b_rx,
            timeout,
        };
        (a, b)
    }

    /// Address of this end, as seen by the peer.
    pub fn addr(&self) -> TransportAddr {
        TransportAddr::Local(self.id)
    }

    /// Address of the peer end.
    pub fn peer_addr(&self) -> TransportAddr {
        TransportAddr::Local(self.peer)
    }

    /// Non-blocking receive of an owned datagram.
    pub fn try_recv_datagram(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}

impl EdclTransport for ChannelTransport {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, TransportAddr)>> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(data) => {
                // Datagram semantics: excess is truncated.
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(Some((n, TransportAddr::Local(self.peer))))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EdclError::TransportClosed),
        }
    }

    fn send(&mut self, addr: &TransportAddr, data: &[u8]) -> Result<()> {
        if *addr != TransportAddr::Local(self.peer) {
            return Err(EdclError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("channel peer is local://{}, not {}", self.peer, addr),
            )));
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| EdclError::TransportClosed)
    }
}
