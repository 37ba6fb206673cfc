//! Error types for the protocol layer.
//!
//! Each crate in turnrelay defines its own error enum. When you see a
//! `ProtocolError`, you know the record itself was malformed; the registry
//! and the matchmaker were never consulted, so nothing changed.

/// Reasons a record can be rejected before it reaches the matchmaker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The record is not `BEGIN` and has no `:` separating an id from the
    /// rest. Expected `<id>:<payload>`.
    #[error("missing ':' separator, expected <id>:<payload>")]
    MissingSeparator,

    /// The id part is empty or contains something other than ASCII digits.
    /// Signs are rejected too, so `-1` and `+1` both land here.
    #[error("client id {0:?} is not a non-negative integer")]
    NonNumericId(String),

    /// The id is numeric but cannot name a registry slot.
    ///
    /// `id` is `None` when the digits did not even fit in a `u64`.
    #[error("client id {id:?} out of range (capacity {capacity})")]
    IdOutOfRange { id: Option<u64>, capacity: u32 },

    /// `<id>:` with nothing after the separator.
    #[error("empty payload for client {0}")]
    EmptyPayload(u32),

    /// A handshake acknowledgement named something other than WHITE/BLACK.
    #[error("unknown color {0:?}")]
    UnknownColor(String),

    /// A record grew past the framing limit before its newline arrived.
    /// The oversized record is discarded up to the next newline.
    #[error("record exceeds {limit} bytes")]
    FrameTooLong { limit: usize },
}
