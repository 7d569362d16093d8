//! Transport Listener
//!
//! Owns the loopback listening socket and at most one connected client.
//! Every operation returns immediately: accept and read use non-blocking
//! std sockets, so a tick never stalls the host's loop.
//!
//! State machine:
//!
//! ```text
//! Unbound -> Bound(no client) -> Bound(client) -> Bound(no client) -> Closed
//! ```
//!
//! `bind` creates the bound state, a successful accept fills the client
//! slot, a detected close empties it, and `close` (or drop) ends it.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::protocol::{self, ServerMessage};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Sleep between accept attempts when a non-zero accept timeout is configured
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

const READ_CHUNK: usize = 4096;

// Unsent reply bytes kept for a client that is not reading
const OUTBOX_LIMIT: usize = 64 * 1024 * 1024;

/// Result of draining the socket into the line buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStatus {
    /// Socket still open (with or without new bytes)
    Open,
    /// Peer closed or reset the connection
    Closed,
}

/// The single connected client
struct Client {
    stream: TcpStream,
    peer: SocketAddr,
    /// Bytes received but not yet returned as a line
    pending: Vec<u8>,
    /// Skipping the tail of an oversized line up to its newline
    discarding: bool,
    /// Peer has closed its side; buffered lines are still served
    closed: bool,
    /// Whole frames queued for the peer; `outbox[sent..]` is still unsent
    outbox: Vec<u8>,
    sent: usize,
}

impl Client {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            pending: Vec::new(),
            discarding: false,
            closed: false,
            outbox: Vec::new(),
            sent: 0,
        }
    }

    /// Read everything currently available without blocking
    fn fill(&mut self, limit: usize) -> ReadStatus {
        let mut chunk = [0u8; READ_CHUNK];

        // Stop early once a full line plus slack is buffered
        while self.pending.len() <= limit {
            match self.stream.read(&mut chunk) {
                Ok(0) => return ReadStatus::Closed,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                    ) =>
                {
                    return ReadStatus::Closed;
                }
                Err(e) => {
                    // Anything else counts as "no data yet"
                    debug!("read from {} failed: {}", self.peer, e);
                    break;
                }
            }
        }

        ReadStatus::Open
    }

    /// Pop one complete line from the buffer
    fn take_line(&mut self, limit: usize) -> Option<String> {
        loop {
            let Some(newline) = self.pending.iter().position(|&b| b == b'\n') else {
                if self.pending.len() > limit {
                    warn!(
                        "discarding oversized line from {} (over {} bytes)",
                        self.peer, limit
                    );
                    self.pending.clear();
                    self.discarding = true;
                }
                return None;
            };

            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if newline > limit {
                warn!(
                    "discarding oversized line from {} ({} bytes)",
                    self.peer, newline
                );
                continue;
            }

            let line = String::from_utf8_lossy(&raw[..newline]);
            return Some(line.trim_end_matches('\r').to_string());
        }
    }

    fn unsent(&self) -> usize {
        self.outbox.len() - self.sent
    }

    /// Queue a complete frame behind anything still unsent
    fn queue(&mut self, frame: &[u8]) {
        if self.sent > 0 {
            self.outbox.drain(..self.sent);
            self.sent = 0;
        }
        self.outbox.extend_from_slice(frame);
    }

    /// Write as much of the outbox as the socket takes without blocking
    ///
    /// A frame cut short by `WouldBlock` keeps its tail queued, so frames
    /// reach the peer whole and in order. A hard error drops the queue.
    fn flush(&mut self) -> io::Result<()> {
        while self.sent < self.outbox.len() {
            match self.stream.write(&self.outbox[self.sent..]) {
                Ok(0) => {
                    self.discard_outbox();
                    return Err(ErrorKind::WriteZero.into());
                }
                Ok(n) => self.sent += n,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.discard_outbox();
                    return Err(e);
                }
            }
        }

        self.discard_outbox();
        Ok(())
    }

    fn discard_outbox(&mut self) {
        self.outbox.clear();
        self.sent = 0;
    }
}

/// Bound listener plus the optional client slot
pub struct Transport {
    listener: TcpListener,
    local_addr: SocketAddr,
    client: Option<Client>,
    accept_timeout: Duration,
    max_line_bytes: usize,
}

impl Transport {
    /// Bind `127.0.0.1:port` in non-blocking mode
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            client: None,
            accept_timeout: config.timeout(),
            max_line_bytes: config.max_line_bytes,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.client.as_ref().map(|c| c.peer)
    }

    /// Accept a pending connection if the client slot is empty
    ///
    /// Returns the new peer's address. With a zero accept timeout this is a
    /// single attempt; otherwise attempts repeat until the timeout elapses.
    pub fn accept_if_none(&mut self) -> Option<SocketAddr> {
        if self.client.is_some() {
            return None;
        }

        let deadline = Instant::now() + self.accept_timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("dropping client {}: cannot set non-blocking: {}", peer, e);
                        return None;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("cannot set nodelay for {}: {}", peer, e);
                    }
                    self.client = Some(Client::new(stream, peer));
                    return Some(peer);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("accept failed: {}", e);
                    return None;
                }
            }
        }
    }

    /// Return at most one complete line from the client
    ///
    /// A closed connection empties the client slot so the next tick goes
    /// back to accepting. Lines already buffered when the peer closed are
    /// still returned first, one per call.
    pub fn receive_line(&mut self) -> Option<String> {
        let limit = self.max_line_bytes;
        let client = self.client.as_mut()?;

        if let Some(line) = client.take_line(limit) {
            return Some(line);
        }

        if !client.closed && client.fill(limit) == ReadStatus::Closed {
            client.closed = true;
        }

        let line = client.take_line(limit);
        if line.is_none() && client.closed {
            info!("client {} disconnected", client.peer);
            self.client = None;
        }
        line
    }

    /// Bytes queued for the client but not yet written
    pub fn pending_output(&self) -> usize {
        self.client.as_ref().map_or(0, Client::unsent)
    }

    /// Push queued reply bytes to the client; failures are swallowed
    pub fn flush(&mut self) {
        if let Some(client) = self.client.as_mut()
            && let Err(e) = client.flush()
        {
            debug!("send to {} failed: {}", client.peer, e);
        }
    }

    /// Queue one frame for the client and write what the socket takes
    ///
    /// Failures are swallowed. A frame that would push the unsent backlog
    /// past the outbox limit is dropped whole. A dead connection is noticed
    /// by the next `receive_line`.
    pub fn send(&mut self, message: &ServerMessage) {
        let Some(client) = self.client.as_mut() else {
            return;
        };

        let line = match protocol::serialize(message) {
            Ok(line) => line,
            Err(e) => {
                debug!("cannot encode frame for {}: {}", client.peer, e);
                return;
            }
        };

        if client.unsent() + line.len() > OUTBOX_LIMIT {
            warn!(
                "dropping {} byte frame for {}: {} bytes still unsent",
                line.len(),
                client.peer,
                client.unsent()
            );
            return;
        }

        client.queue(line.as_bytes());
        if let Err(e) = client.flush() {
            debug!("send to {} failed: {}", client.peer, e);
        }
    }

    /// Close the client (if any) and the listener
    pub fn close(mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.stream.shutdown(Shutdown::Both);
        }
    }
}
