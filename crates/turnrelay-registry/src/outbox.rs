//! The per-client pending outgoing buffer.
//!
//! An [`Outbox`] holds at most one logical undelivered message. Writing a
//! new message over one that has not started transmitting replaces it
//! (last-write-wins): backpressure can drop superseded messages but can
//! never grow memory without bound.
//!
//! Once the first bytes of a message have hit the socket, replacing it
//! would leave the peer with a torn record. In that case the remainder is
//! finished first and the newer message waits in a single `queued` slot,
//! which is itself last-write-wins.

use std::io;

/// Pending bytes for one client, plus how many of them are already written.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    current: Vec<u8>,
    written: usize,
    queued: Option<Vec<u8>>,
}

/// What a [`Outbox::flush_with`] call achieved.
#[derive(Debug)]
pub struct FlushReport {
    /// Messages fully written during this call.
    pub delivered: u64,
    pub status: FlushStatus,
}

/// Where the outbox stands after a flush attempt.
#[derive(Debug)]
pub enum FlushStatus {
    /// Nothing left to write. Write interest can be dropped.
    Drained,
    /// The socket stopped accepting bytes; keep write interest.
    Pending,
    /// The socket failed. The remaining bytes stay in the outbox.
    Failed(io::Error),
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `bytes` (already framed) for delivery.
    ///
    /// Returns `true` if an undelivered message was overwritten.
    pub fn replace(&mut self, bytes: Vec<u8>) -> bool {
        if self.written == 0 {
            let superseded = !self.current.is_empty();
            self.current = bytes;
            superseded
        } else {
            self.queued.replace(bytes).is_some()
        }
    }

    /// Returns `true` when nothing is waiting to be written.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.queued.is_none()
    }

    /// The unwritten tail of the message currently in flight.
    pub fn remaining(&self) -> &[u8] {
        &self.current[self.written..]
    }

    /// Returns `true` if a prefix of the current message is already on the
    /// wire.
    pub fn in_flight(&self) -> bool {
        self.written > 0
    }

    /// Drops everything, delivered or not.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Feeds pending bytes to `write` until it drains the outbox, would
    /// block, or fails.
    ///
    /// `write` has `Write::write` semantics: it returns how many bytes of
    /// the slice it accepted, `WouldBlock` when it accepted none for now,
    /// or any other error for a broken sink. Accepted bytes are never
    /// offered again and unaccepted bytes are never skipped.
    pub fn flush_with<W>(&mut self, mut write: W) -> FlushReport
    where
        W: FnMut(&[u8]) -> io::Result<usize>,
    {
        let mut delivered = 0;
        loop {
            if self.current.is_empty() {
                match self.queued.take() {
                    Some(next) => {
                        self.current = next;
                        self.written = 0;
                    }
                    None => {
                        return FlushReport {
                            delivered,
                            status: FlushStatus::Drained,
                        };
                    }
                }
            }

            match write(self.remaining()) {
                Ok(0) => {
                    return FlushReport {
                        delivered,
                        status: FlushStatus::Failed(io::ErrorKind::WriteZero.into()),
                    };
                }
                Ok(n) => {
                    self.written += n;
                    if self.written >= self.current.len() {
                        self.current.clear();
                        self.written = 0;
                        delivered += 1;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return FlushReport {
                        delivered,
                        status: FlushStatus::Pending,
                    };
                }
                Err(e) => {
                    return FlushReport {
                        delivered,
                        status: FlushStatus::Failed(e),
                    };
                }
            }
        }
    }
}
