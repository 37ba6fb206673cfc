//! The registry: a fixed-capacity slot table plus a connection index.
//!
//! # Concurrency note
//!
//! `Registry` is NOT thread-safe by itself: it is a plain `Vec` and
//! `HashMap`. It is owned by the matchmaker, which is owned by the single
//! event-loop task, so every mutation happens on one logical thread.

use std::collections::HashMap;
use std::io;

use turnrelay_protocol::ClientId;
use turnrelay_transport::ConnectionId;

use crate::{ClientRecord, FlushReport, FlushStatus, RegistryError, SlotState};

/// Default number of slots, including the reserved slot 0.
pub const DEFAULT_CAPACITY: u32 = 100;

/// Fixed-capacity table of client records.
///
/// ## Lifecycle
///
/// ```text
/// allocate() ──→ bind() ──→ unbind() / bind() elsewhere ──→ release()
///     │                                                        │
///     ▼                                                        ▼
///  [Waiting]  (caller then pairs or parks it)               [Free]
/// ```
pub struct Registry {
    /// Slot `i` holds the record for `ClientId(i)`. Slot 0 is never handed
    /// out.
    slots: Vec<ClientRecord>,

    /// Which client currently owns each bound connection.
    ///
    /// Kept in sync with `ClientRecord::connection` by every method that
    /// touches bindings, so a connection belongs to at most one record.
    by_connection: HashMap<ConnectionId, ClientId>,
}

impl Registry {
    /// Creates a registry with `capacity` slots (ids `1..capacity` usable).
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: (0..capacity).map(|i| ClientRecord::vacant(ClientId(i))).collect(),
            by_connection: HashMap::new(),
        }
    }

    /// Total number of slots, including the reserved one.
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Claims the lowest free id.
    ///
    /// The slot comes back `Waiting` with no connection; the caller is
    /// expected to bind it and either pair it or make it the waiting record
    /// within the same step.
    ///
    /// # Errors
    /// Returns [`RegistryError::Full`] when every usable slot is taken.
    pub fn allocate(&mut self) -> Result<ClientId, RegistryError> {
        let capacity = self.capacity();
        let record = self
            .slots
            .iter_mut()
            .skip(1)
            .find(|record| record.state == SlotState::Free)
            .ok_or(RegistryError::Full { capacity })?;
        record.state = SlotState::Waiting;
        tracing::debug!(client_id = %record.id(), "slot allocated");
        Ok(record.id())
    }

    /// Looks up an allocated record.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] for id 0, ids past the end, and free
    /// slots.
    pub fn lookup(&self, id: ClientId) -> Result<&ClientRecord, RegistryError> {
        if id == ClientId::RESERVED {
            return Err(RegistryError::NotFound(id));
        }
        self.slots
            .get(id.index())
            .filter(|record| record.state.is_allocated())
            .ok_or(RegistryError::NotFound(id))
    }

    /// Mutable variant of [`lookup`](Self::lookup).
    pub fn lookup_mut(
        &mut self,
        id: ClientId,
    ) -> Result<&mut ClientRecord, RegistryError> {
        if id == ClientId::RESERVED {
            return Err(RegistryError::NotFound(id));
        }
        self.slots
            .get_mut(id.index())
            .filter(|record| record.state.is_allocated())
            .ok_or(RegistryError::NotFound(id))
    }

    /// Reverse lookup: which client does this connection speak for?
    pub fn lookup_by_connection(&self, conn: ConnectionId) -> Option<ClientId> {
        self.by_connection.get(&conn).copied()
    }

    /// Binds `conn` to `id`.
    ///
    /// Ownership moves in one step: if `conn` belonged to another record,
    /// that record loses it; if `id` was bound to another connection, that
    /// binding is forgotten. Returns the record that lost `conn`, if any.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if `id` is not allocated.
    pub fn bind(
        &mut self,
        id: ClientId,
        conn: ConnectionId,
    ) -> Result<Option<ClientId>, RegistryError> {
        self.lookup(id)?;

        let displaced = self.by_connection.insert(conn, id).filter(|&owner| owner != id);
        if let Some(owner) = displaced {
            self.slots[owner.index()].connection = None;
            tracing::debug!(%conn, from = %owner, to = %id, "connection changed owner");
        }

        let previous = self.slots[id.index()].connection.replace(conn);
        if let Some(old) = previous.filter(|&old| old != conn) {
            self.by_connection.remove(&old);
            tracing::debug!(client_id = %id, %old, new = %conn, "client rebound");
        }
        Ok(displaced)
    }

    /// Forgets the binding for `conn` and returns its former owner.
    pub fn unbind(&mut self, conn: ConnectionId) -> Option<ClientId> {
        let owner = self.by_connection.remove(&conn)?;
        self.slots[owner.index()].connection = None;
        Some(owner)
    }

    /// Resets the slot to its default free state.
    ///
    /// Returns the record as it was before the reset.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if `id` is not allocated.
    pub fn release(&mut self, id: ClientId) -> Result<ClientRecord, RegistryError> {
        self.lookup(id)?;
        let old = std::mem::replace(&mut self.slots[id.index()], ClientRecord::vacant(id));
        if let Some(conn) = old.connection {
            self.by_connection.remove(&conn);
        }
        tracing::debug!(client_id = %id, "slot released");
        Ok(old)
    }

    /// Writes the outbox of whoever owns `conn` through `write`.
    ///
    /// Returns `None` when no record owns the connection. Fully delivered
    /// messages are added to the owner's `sent` counter.
    pub fn flush<W>(&mut self, conn: ConnectionId, write: W) -> Option<FlushReport>
    where
        W: FnMut(&[u8]) -> io::Result<usize>,
    {
        let owner = self.lookup_by_connection(conn)?;
        let record = &mut self.slots[owner.index()];
        let report = record.outbox.flush_with(write);
        record.sent += report.delivered;
        if let FlushStatus::Failed(e) = &report.status {
            tracing::debug!(client_id = %owner, %conn, error = %e, "flush failed");
        }
        Some(report)
    }

    /// Number of allocated (non-free) slots.
    pub fn allocated(&self) -> usize {
        self.iter().count()
    }

    /// Iterates over allocated records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.slots.iter().filter(|record| record.state.is_allocated())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// =========================================================================
// Tests
// =========================================================================
