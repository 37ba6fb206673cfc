//! Per-wakeup handling: reads, record dispatch, flushes and closes.
//!
//! The server loop owns the [`SocketSet`] and a [`Dispatcher`], and hands
//! every [`Wakeup`] to [`Dispatcher::handle`]. For one wakeup the flow is:
//!   1. Readable → read one chunk → framer → matchmaker → directives
//!   2. Writable → flush the owner's outbox → drop write interest when empty
//!   3. Any hard failure → unbind the owner and drop the socket
//!
//! Nothing in here awaits. Errors on one connection never reach another.

use std::collections::HashMap;

use turnrelay_matchmaking::{Directive, MatchError, Matchmaker};
use turnrelay_protocol::LineFramer;
use turnrelay_registry::FlushStatus;
use turnrelay_transport::{ConnectionId, ReadOutcome, SocketSet, Wakeup};

use crate::RelayConfig;

/// Everything the loop mutates besides the sockets themselves.
pub(crate) struct Dispatcher {
    matchmaker: Matchmaker,
    framers: HashMap<ConnectionId, LineFramer>,
    scratch: Vec<u8>,
    max_record_len: usize,
}

impl Dispatcher {
    pub(crate) fn new(config: &RelayConfig) -> Self {
        Self {
            matchmaker: Matchmaker::new(config.match_config()),
            framers: HashMap::new(),
            scratch: vec![0; config.read_chunk.max(1)],
            max_record_len: config.max_record_len,
        }
    }

    pub(crate) fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Processes one readiness notification.
    pub(crate) fn handle(&mut self, sockets: &mut SocketSet, wakeup: Wakeup) {
        match wakeup {
            Wakeup::Accepted { conn, .. } => {
                self.framers.insert(conn, LineFramer::new(self.max_record_len));
            }
            Wakeup::Ready {
                conn,
                readable,
                writable,
            } => {
                // An earlier wakeup in the same batch may have closed it.
                if !sockets.contains(conn) {
                    return;
                }
                if readable {
                    self.on_readable(sockets, conn);
                }
                let wants_write = sockets.interest(conn).is_some_and(|i| i.write);
                if writable && wants_write {
                    self.on_writable(sockets, conn);
                }
            }
            Wakeup::Failed { conn, error } => {
                tracing::debug!(%conn, error = %error, "readiness failed");
                self.close(sockets, conn);
            }
        }
    }

    fn on_readable(&mut self, sockets: &mut SocketSet, conn: ConnectionId) {
        let n = match sockets.read(conn, &mut self.scratch) {
            ReadOutcome::Data(n) => n,
            ReadOutcome::WouldBlock => return,
            ReadOutcome::Closed => {
                tracing::info!(%conn, "peer hung up");
                self.close(sockets, conn);
                return;
            }
            ReadOutcome::Failed(e) => {
                tracing::debug!(%conn, error = %e, "read failed");
                self.close(sockets, conn);
                return;
            }
        };

        let framer = self
            .framers
            .entry(conn)
            .or_insert_with(|| LineFramer::new(self.max_record_len));
        framer.push(&self.scratch[..n]);
        let records: Vec<_> = std::iter::from_fn(|| framer.next_record()).collect();

        for record in records {
            // A terminate earlier in this chunk closes the connection; the
            // rest of the chunk goes with it.
            if !sockets.contains(conn) {
                break;
            }
            match record {
                Ok(record) => self.dispatch(sockets, conn, &record),
                Err(e) => tracing::warn!(%conn, error = %e, "dropping record"),
            }
        }
    }

    fn dispatch(&mut self, sockets: &mut SocketSet, conn: ConnectionId, record: &[u8]) {
        match self.matchmaker.handle_record(conn, record) {
            Ok(directives) => self.apply(sockets, directives),
            Err(MatchError::Protocol(e)) => {
                tracing::warn!(
                    %conn,
                    record = %String::from_utf8_lossy(record),
                    error = %e,
                    "malformed record"
                );
            }
            Err(e) => tracing::warn!(%conn, error = %e, "record dropped"),
        }
    }

    fn apply(&mut self, sockets: &mut SocketSet, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::WantWrite(target) => {
                    if !sockets.want_write(target) {
                        tracing::debug!(conn = %target, "write target already gone");
                    }
                }
                Directive::Close(target) => self.close(sockets, target),
            }
        }
    }

    fn on_writable(&mut self, sockets: &mut SocketSet, conn: ConnectionId) {
        let flushed = self
            .matchmaker
            .registry_mut()
            .flush(conn, |bytes| sockets.write(conn, bytes));

        let Some(report) = flushed else {
            // Nobody owns this socket any more.
            sockets.clear_write(conn);
            return;
        };
        if report.delivered > 0 {
            tracing::debug!(%conn, delivered = report.delivered, "flushed");
        }
        match report.status {
            FlushStatus::Drained => sockets.clear_write(conn),
            FlushStatus::Pending => {}
            FlushStatus::Failed(e) => {
                tracing::debug!(%conn, error = %e, "write failed");
                self.close(sockets, conn);
            }
        }
    }

    /// Unbinds the connection's owner and drops the socket.
    fn close(&mut self, sockets: &mut SocketSet, conn: ConnectionId) {
        if let Some(owner) = self.matchmaker.connection_closed(conn) {
            tracing::debug!(%conn, client_id = %owner, "owner detached");
        }
        self.framers.remove(&conn);
        sockets.close(conn);
    }
}
