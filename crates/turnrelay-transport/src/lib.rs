//! Transport layer for turnrelay.
//!
//! Owns the listening socket and every accepted TCP connection, tracks
//! per-connection read/write interest, and exposes a single bounded
//! readiness wait ([`SocketSet::wait`]) over all of them.
//!
//! Nothing here blocks: reads and writes are `try_read`/`try_write` calls
//! that the event loop issues only after the connection reported ready.
//! A spurious wakeup simply surfaces as `WouldBlock`.

mod error;
mod socket_set;

pub use error::TransportError;
pub use socket_set::{ACCEPT_BACKOFF, Interest, ReadOutcome, SocketSet, Wakeup};

use std::fmt;

/// Handle for one accepted TCP connection.
///
/// The [`SocketSet`] numbers connections from 1 upward as it accepts them.
/// A number is never issued twice, so a record still holding the id of a
/// connection that has since closed cannot be mistaken for whoever
/// connected next. Ordering follows accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw sequence number. Outside the socket set this is only
    /// useful for tests that drive the state machine without sockets.
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The sequence number in accept order.
    pub fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
