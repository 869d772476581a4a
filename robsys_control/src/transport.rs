//! Bounded-message transport channels.
//!
//! Every channel is opened in server mode at a fixed address/port and is
//! non-blocking on read. Messages never exceed [`MAX_MESSAGE_LENGTH`].
//!
//! | Role | Transport | Peers |
//! |------|-----------|-------|
//! | [`ChannelRole::Reliable`] | TCP listener | every accepted connection |
//! | [`ChannelRole::Datagram`] | UDP socket | every address that has sent a datagram |
//!
//! `write()` delivers to all known peers, so a datagram client must send at
//! least one (possibly empty) datagram before it receives anything.

use parking_lot::Mutex;
use robsys_common::protocol::MAX_MESSAGE_LENGTH;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One bounded message as read from a channel.
pub type Message = heapless::Vec<u8, MAX_MESSAGE_LENGTH>;

/// Upper bound on remembered datagram peers per channel.
pub const MAX_DATAGRAM_PEERS: usize = 16;

/// How long one stream write may wait on a full socket buffer before the
/// client is dropped.
pub const WRITE_STALL_BUDGET: Duration = Duration::from_millis(1);

/// Error types for channel operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Bind/listen failed
    #[error("Failed to open {role:?} channel on {addr}: {source}")]
    Bind {
        /// Requested channel role
        role: ChannelRole,
        /// Requested address
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Outbound message exceeds the channel bound
    #[error("Message of {0} bytes exceeds the channel limit")]
    Oversized(usize),

    /// Channel already closed
    #[error("Channel closed")]
    Closed,

    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reliability class of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Reliable stream (TCP server).
    Reliable,
    /// Unreliable datagrams (UDP server).
    Datagram,
}

/// Bounded-message, non-blocking connection.
pub trait Channel: Send {
    /// Next pending message, or `None` when nothing is pending.
    ///
    /// Never blocks.
    fn try_read(&mut self) -> Option<Message>;

    /// Send `bytes` to every known peer.
    ///
    /// There is no per-request addressing: on the events channel every
    /// connected client receives every reply, including replies to other
    /// clients' requests.
    ///
    /// # Errors
    /// `Oversized` if `bytes` exceeds the message bound, `Closed` after `close()`.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Release the underlying socket. Idempotent.
    fn close(&mut self);

    /// Bound local address, if any.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Open a server channel.
///
/// `address` of `None` binds all interfaces.
///
/// # Errors
/// Returns `TransportError` if the address is malformed or the socket cannot be bound.
pub fn open(
    role: ChannelRole,
    address: Option<&str>,
    port: u16,
) -> Result<Box<dyn Channel>, TransportError> {
    let ip = match address {
        Some(addr) => addr
            .parse::<IpAddr>()
            .map_err(|_| TransportError::InvalidAddress(addr.to_string()))?,
        None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };
    let addr = SocketAddr::new(ip, port);

    let channel: Box<dyn Channel> = match role {
        ChannelRole::Reliable => Box::new(TcpServerChannel::bind(addr)?),
        ChannelRole::Datagram => Box::new(UdpServerChannel::bind(addr)?),
    };
    info!("Opened {:?} channel on {}", role, addr);
    Ok(channel)
}

fn check_length(bytes: &[u8]) -> Result<(), TransportError> {
    if bytes.len() > MAX_MESSAGE_LENGTH {
        return Err(TransportError::Oversized(bytes.len()));
    }
    Ok(())
}

// ─── TCP ────────────────────────────────────────────────────────────

/// Reliable request/reply channel over a non-blocking TCP listener.
///
/// Each successful `read()` on a connection is one message. A client whose
/// receive window stays full for longer than [`WRITE_STALL_BUDGET`] is
/// disconnected; it may have received the head of the last message.
pub struct TcpServerChannel {
    listener: Option<TcpListener>,
    clients: Vec<TcpStream>,
}

impl TcpServerChannel {
    /// Bind and listen on `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            role: ChannelRole::Reliable,
            addr,
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        Ok(Self {
            listener: Some(listener),
            clients: Vec::new(),
        })
    }

    fn accept_pending(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("Dropping client {}: set_nonblocking failed: {}", peer, e);
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    info!("Events client connected: {}", peer);
                    self.clients.push(stream);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error accepting client connection: {}", e);
                    break;
                }
            }
        }
    }
}

impl Channel for TcpServerChannel {
    fn try_read(&mut self) -> Option<Message> {
        self.accept_pending();

        let mut buf = [0u8; MAX_MESSAGE_LENGTH];
        let mut index = 0;
        while index < self.clients.len() {
            match self.clients[index].read(&mut buf) {
                Ok(0) => {
                    debug!("Events client disconnected");
                    self.clients.swap_remove(index);
                }
                Ok(n) => {
                    // n <= buf.len() == capacity
                    return Message::from_slice(&buf[..n]).ok();
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => index += 1,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Dropping events client after read error: {}", e);
                    self.clients.swap_remove(index);
                }
            }
        }
        None
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        check_length(bytes)?;
        if self.listener.is_none() {
            return Err(TransportError::Closed);
        }
        self.clients
            .retain_mut(|client| match write_within(client, bytes, WRITE_STALL_BUDGET) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping events client after write error: {}", e);
                    false
                }
            });
        Ok(())
    }

    fn close(&mut self) {
        self.clients.clear();
        self.listener = None;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

/// `write_all` for a non-blocking stream, giving up once `budget` has been
/// spent waiting on `WouldBlock`.
fn write_within(
    stream: &mut TcpStream,
    mut bytes: &[u8],
    budget: Duration,
) -> std::io::Result<()> {
    let start = Instant::now();
    while !bytes.is_empty() {
        match stream.write(bytes) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => bytes = &bytes[n..],
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() >= budget {
                    return Err(ErrorKind::TimedOut.into());
                }
                std::thread::yield_now();
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ─── UDP ────────────────────────────────────────────────────────────

/// Unreliable channel over a non-blocking UDP socket.
///
/// Datagrams longer than [`MAX_MESSAGE_LENGTH`] are discarded whole.
pub struct UdpServerChannel {
    socket: Option<UdpSocket>,
    peers: heapless::Vec<SocketAddr, MAX_DATAGRAM_PEERS>,
}

impl UdpServerChannel {
    /// Bind on `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            role: ChannelRole::Datagram,
            addr,
            source,
        };
        let socket = UdpSocket::bind(addr).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        Ok(Self {
            socket: Some(socket),
            peers: heapless::Vec::new(),
        })
    }

    fn register_peer(&mut self, peer: SocketAddr) {
        if self.peers.contains(&peer) {
            return;
        }
        if self.peers.push(peer).is_err() {
            // Full: forget the oldest subscriber.
            self.peers.remove(0);
            let _ = self.peers.push(peer);
        }
        info!("Datagram peer registered: {}", peer);
    }
}

impl Channel for UdpServerChannel {
    fn try_read(&mut self) -> Option<Message> {
        // One spare byte detects datagrams above the bound.
        let mut buf = [0u8; MAX_MESSAGE_LENGTH + 1];
        loop {
            let socket = self.socket.as_ref()?;
            match socket.recv_from(&mut buf) {
                Ok((n, peer)) => {
                    self.register_peer(peer);
                    if n > MAX_MESSAGE_LENGTH {
                        warn!("Discarding oversized datagram from {}", peer);
                        continue;
                    }
                    return Message::from_slice(&buf[..n]).ok();
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("Datagram receive error: {}", e);
                    return None;
                }
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        check_length(bytes)?;
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        for peer in &self.peers {
            if let Err(e) = socket.send_to(bytes, peer) {
                debug!("Datagram send to {} failed: {}", peer, e);
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.peers.clear();
        self.socket = None;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

// ─── In-memory ──────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryQueues {
    inbound: VecDeque<Message>,
    outbound: VecDeque<Vec<u8>>,
    closed: bool,
}

/// In-process channel for tests and simulation.
///
/// Created together with a [`MemoryPeer`] that plays the remote client.
pub struct MemoryChannel {
    queues: Arc<Mutex<MemoryQueues>>,
}

/// Client side of a [`MemoryChannel`].
#[derive(Clone)]
pub struct MemoryPeer {
    queues: Arc<Mutex<MemoryQueues>>,
}

impl MemoryChannel {
    /// Create a connected channel/peer pair.
    pub fn pair() -> (Self, MemoryPeer) {
        let queues = Arc::new(Mutex::new(MemoryQueues::default()));
        (
            Self {
                queues: Arc::clone(&queues),
            },
            MemoryPeer { queues },
        )
    }
}

impl Channel for MemoryChannel {
    fn try_read(&mut self) -> Option<Message> {
        let mut queues = self.queues.lock();
        if queues.closed {
            return None;
        }
        queues.inbound.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        check_length(bytes)?;
        let mut queues = self.queues.lock();
        if queues.closed {
            return Err(TransportError::Closed);
        }
        queues.outbound.push_back(bytes.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.queues.lock().closed = true;
    }
}

impl MemoryPeer {
    /// Queue a message for the server side.
    ///
    /// # Errors
    /// `Oversized` if `bytes` exceeds the message bound.
    pub fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let message =
            Message::from_slice(bytes).map_err(|_| TransportError::Oversized(bytes.len()))?;
        self.queues.lock().inbound.push_back(message);
        Ok(())
    }

    /// Next message written by the server side.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.queues.lock().outbound.pop_front()
    }

    /// All messages written by the server side so far.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.queues.lock().outbound.drain(..).collect()
    }

    /// Whether the server side has been closed.
    pub fn is_closed(&self) -> bool {
        self.queues.lock().closed
    }
}
