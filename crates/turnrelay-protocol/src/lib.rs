//! Wire protocol for turnrelay.
//!
//! This crate defines the "language" that peers and the relay speak:
//!
//! - **Types** ([`Event`], [`ServerMessage`], [`ClientId`], [`Color`]) —
//!   the records that travel on the wire, in decoded form.
//! - **Framing** ([`LineFramer`], [`frame`]) — how a TCP byte stream is cut
//!   into records. Every record ends with `\n`.
//! - **Codec** ([`Codec`] trait, [`TextCodec`]) — how a single record is
//!   turned into an [`Event`] and how replies are turned into bytes.
//! - **Errors** ([`ProtocolError`]) — why a record was rejected.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and matchmaking
//! (client records). It doesn't know about sockets or pairing; it only
//! knows how to cut, parse and format records.
//!
//! ```text
//! Transport (bytes) → LineFramer (records) → Codec (Event) → Matchmaker
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod framing;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

// Users write `use turnrelay_protocol::Event` instead of reaching into the
// submodules.

pub use codec::{Codec, TextCodec};
pub use error::ProtocolError;
pub use framing::{DEFAULT_MAX_RECORD_LEN, LineFramer, frame};
pub use types::{
    BEGIN_TOKEN, ClientId, Color, END_TOKEN, Event, RECONNECT_TOKEN,
    SEPARATOR, ServerMessage,
};
