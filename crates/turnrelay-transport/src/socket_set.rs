//! The socket set: listener, connections, interest flags and the readiness
//! wait.
//!
//! The set is driven by exactly one task. Each call to [`SocketSet::wait`]
//! races the listener's `accept` against a `ready()` future for every
//! connection that has any interest registered, bounded by a timeout. The
//! first completion wakes the loop; every other readiness that is already
//! available is collected without waiting again, so one wakeup reports
//! everything that can make progress right now.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::io::Interest as IoInterest;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use crate::{ConnectionId, TransportError};

/// Storage is shrunk once it is this many times larger than the number of
/// live connections.
const SHRINK_FACTOR: usize = 4;

/// Never shrink below this many slots; small maps are not worth it.
const SHRINK_FLOOR: usize = 64;

/// How long accepts stay paused after the process runs out of file
/// descriptors or memory.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(250);

/// Which readiness events the loop currently cares about for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    /// Read interest only. Every new connection starts here.
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };

    fn to_tokio(self) -> Option<IoInterest> {
        match (self.read, self.write) {
            (true, true) => Some(IoInterest::READABLE | IoInterest::WRITABLE),
            (true, false) => Some(IoInterest::READABLE),
            (false, true) => Some(IoInterest::WRITABLE),
            (false, false) => None,
        }
    }
}

/// One readiness notification produced by [`SocketSet::wait`].
#[derive(Debug)]
pub enum Wakeup {
    /// The listener produced a new connection, already registered for reads.
    Accepted { conn: ConnectionId, peer: SocketAddr },

    /// A connection can make progress in at least one direction.
    Ready {
        conn: ConnectionId,
        readable: bool,
        writable: bool,
    },

    /// Polling the connection itself failed. The loop should drop it.
    Failed { conn: ConnectionId, error: io::Error },
}

/// Result of a non-blocking read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// The peer shut down its side of the connection.
    Closed,
    /// The readiness was spurious; try again after the next wakeup.
    WouldBlock,
    /// Any other failure. The connection is unusable.
    Failed(io::Error),
}

struct Socket {
    stream: TcpStream,
    peer: SocketAddr,
    interest: Interest,
}

/// The listening socket plus every accepted connection.
pub struct SocketSet {
    listener: TcpListener,
    sockets: HashMap<ConnectionId, Socket>,
    next_id: u64,
    /// Set while the listener is backing off after resource exhaustion.
    accept_paused_until: Option<Instant>,
}

impl SocketSet {
    /// Binds a listener to `addr` and returns an empty set around it.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Bind)?;
        tracing::info!(addr, "listening for peers");
        Ok(Self::from_listener(listener))
    }

    /// Wraps an already bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            sockets: HashMap::new(),
            next_id: 1,
            accept_paused_until: None,
        }
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits until the listener or any interested connection is ready, or
    /// until `timeout` elapses.
    ///
    /// An empty result means the timeout fired with nothing to do.
    ///
    /// While accepts are paused (see [`ACCEPT_BACKOFF`]) the listener is
    /// left alone and the wait also returns when the pause ends.
    ///
    /// # Errors
    /// Returns [`TransportError::Accept`] when the listener fails with an
    /// error that retrying cannot fix. Transient accept failures are logged
    /// and swallowed.
    pub async fn wait(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<Wakeup>, TransportError> {
        let mut wakeups = Vec::new();
        let accepted;

        if self.accept_paused_until.is_some_and(|until| until <= Instant::now()) {
            self.accept_paused_until = None;
            tracing::info!("resuming accepts");
        }
        let paused_until = self.accept_paused_until;
        let accepting = paused_until.is_none();

        {
            // Borrow the two fields separately so the readiness futures
            // (which hold `&TcpStream`) can coexist with the accept future.
            let listener = &self.listener;
            let mut pending: FuturesUnordered<_> = self
                .sockets
                .iter()
                .filter_map(|(&conn, socket)| {
                    socket
                        .interest
                        .to_tokio()
                        .map(|interest| (conn, &socket.stream, interest))
                })
                .map(|(conn, stream, interest)| async move {
                    (conn, stream.ready(interest).await)
                })
                .collect();

            let accept = listener.accept();
            tokio::pin!(accept);
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);
            let resume = tokio::time::sleep_until(paused_until.unwrap_or_else(Instant::now));
            tokio::pin!(resume);

            let mut first_accept = None;
            tokio::select! {
                result = &mut accept, if accepting => first_accept = Some(result),
                Some((conn, result)) = pending.next() => {
                    wakeups.push(into_wakeup(conn, result));
                }
                () = &mut resume, if !accepting => return Ok(wakeups),
                () = &mut deadline => return Ok(wakeups),
            }

            while let Some(Some((conn, result))) = pending.next().now_or_never()
            {
                wakeups.push(into_wakeup(conn, result));
            }

            accepted = match first_accept {
                Some(result) => Some(result),
                None if accepting => accept.as_mut().now_or_never(),
                None => None,
            };
        }

        match accepted {
            Some(Ok((stream, peer))) => {
                let conn = self.register(stream, peer);
                wakeups.push(Wakeup::Accepted { conn, peer });
            }
            Some(Err(e)) => self.accept_failed(e)?,
            None => {}
        }

        Ok(wakeups)
    }

    /// Decides what a failed `accept` means for the listener.
    fn accept_failed(&mut self, e: io::Error) -> Result<(), TransportError> {
        match classify_accept_error(&e) {
            AcceptFailure::Retry => {
                tracing::warn!(error = %e, "transient accept failure");
                Ok(())
            }
            AcceptFailure::Backoff => {
                tracing::warn!(
                    error = %e,
                    pause_ms = ACCEPT_BACKOFF.as_millis() as u64,
                    "out of resources, pausing accepts"
                );
                self.accept_paused_until = Some(Instant::now() + ACCEPT_BACKOFF);
                Ok(())
            }
            AcceptFailure::Fatal => Err(TransportError::Accept(e)),
        }
    }

    /// True while accepts are paused after resource exhaustion.
    pub fn accepts_paused(&self) -> bool {
        self.accept_paused_until.is_some_and(|until| until > Instant::now())
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) -> ConnectionId {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "could not disable nagle");
        }
        let conn = ConnectionId::new(self.next_id);
        self.next_id += 1;
        self.sockets.insert(
            conn,
            Socket {
                stream,
                peer,
                interest: Interest::READ,
            },
        );
        tracing::info!(%conn, %peer, "new connection");
        conn
    }

    /// Reads at most `buf.len()` bytes without blocking.
    pub fn read(&self, conn: ConnectionId, buf: &mut [u8]) -> ReadOutcome {
        let Some(socket) = self.sockets.get(&conn) else {
            return ReadOutcome::Failed(not_connected(conn));
        };
        match socket.stream.try_read(buf) {
            Ok(0) => ReadOutcome::Closed,
            Ok(n) => ReadOutcome::Data(n),
            Err(e) if is_retryable(&e) => ReadOutcome::WouldBlock,
            Err(e) => ReadOutcome::Failed(e),
        }
    }

    /// Writes as much of `bytes` as the socket accepts without blocking.
    ///
    /// Returns the number of bytes written, or an `io::Error` whose kind is
    /// `WouldBlock` when nothing could be written right now.
    pub fn write(&self, conn: ConnectionId, bytes: &[u8]) -> io::Result<usize> {
        let socket = self.sockets.get(&conn).ok_or_else(|| not_connected(conn))?;
        match socket.stream.try_write(bytes) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                Err(io::ErrorKind::WouldBlock.into())
            }
            other => other,
        }
    }

    /// Returns the current interest for `conn`, if it is still open.
    pub fn interest(&self, conn: ConnectionId) -> Option<Interest> {
        self.sockets.get(&conn).map(|socket| socket.interest)
    }

    /// Registers write interest. Returns `false` if the connection is gone.
    pub fn want_write(&mut self, conn: ConnectionId) -> bool {
        match self.sockets.get_mut(&conn) {
            Some(socket) => {
                socket.interest.write = true;
                true
            }
            None => false,
        }
    }

    /// Drops write interest for `conn`.
    pub fn clear_write(&mut self, conn: ConnectionId) {
        if let Some(socket) = self.sockets.get_mut(&conn) {
            socket.interest.write = false;
        }
    }

    /// Removes the connection from the set, closing the socket.
    ///
    /// Returns the peer address when the connection was still open.
    pub fn close(&mut self, conn: ConnectionId) -> Option<SocketAddr> {
        let socket = self.sockets.remove(&conn)?;
        let live = self.sockets.len();
        if self.sockets.capacity() > SHRINK_FLOOR
            && self.sockets.capacity() > live * SHRINK_FACTOR
        {
            self.sockets.shrink_to((live * 2).max(SHRINK_FLOOR));
        }
        tracing::debug!(%conn, peer = %socket.peer, live, "connection closed");
        Some(socket.peer)
    }

    /// Returns the remote address of `conn`.
    pub fn peer_addr(&self, conn: ConnectionId) -> Option<SocketAddr> {
        self.sockets.get(&conn).map(|socket| socket.peer)
    }

    /// Returns `true` if `conn` is still part of the set.
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.sockets.contains_key(&conn)
    }

    /// Returns the number of open client connections.
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Returns `true` if no client connection is open.
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

fn into_wakeup(conn: ConnectionId, result: io::Result<tokio::io::Ready>) -> Wakeup {
    match result {
        Ok(ready) => Wakeup::Ready {
            conn,
            readable: ready.is_readable(),
            writable: ready.is_writable(),
        },
        Err(error) => Wakeup::Failed { conn, error },
    }
}

fn not_connected(conn: ConnectionId) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        TransportError::Closed(conn),
    )
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// What the loop does after a failed `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// Only the pending connection was affected; accept again right away.
    Retry,

    /// The process is out of descriptors or memory. Accepting again at once
    /// fails the same way, so pause for [`ACCEPT_BACKOFF`].
    Backoff,

    /// The listener itself is broken.
    Fatal,
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    // EMFILE / ENFILE share these values on Linux and the BSDs.
    #[cfg(unix)]
    if matches!(e.raw_os_error(), Some(23) | Some(24)) {
        return AcceptFailure::Backoff;
    }
    match e.kind() {
        io::ErrorKind::OutOfMemory => AcceptFailure::Backoff,
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptFailure::Retry,
        _ => AcceptFailure::Fatal,
    }
}
