//! Client registry for turnrelay.
//!
//! This crate holds everything the relay knows about its participants:
//!
//! 1. **Slots** — a fixed-capacity table of [`ClientRecord`]s indexed by
//!    [`ClientId`](turnrelay_protocol::ClientId), each with an explicit
//!    [`SlotState`].
//! 2. **Connection ownership** — which socket currently speaks for which
//!    client, kept as a reverse index so "who owns this socket?" is a map
//!    lookup and a socket can never belong to two records.
//! 3. **Outgoing buffers** — the [`Outbox`] each record carries, including
//!    partial-write bookkeeping.
//!
//! # How it fits in the stack
//!
//! ```text
//! Matchmaking (above)  ← pairs records, queues acknowledgements and moves
//!     ↕
//! Registry (this crate)  ← owns slots, bindings and outboxes
//!     ↕
//! Protocol / Transport (below)  ← provide ClientId, Color, ConnectionId
//! ```

mod error;
mod outbox;
mod record;
mod registry;

pub use error::RegistryError;
pub use outbox::{FlushReport, FlushStatus, Outbox};
pub use record::{ClientRecord, SlotState};
pub use registry::{DEFAULT_CAPACITY, Registry};
