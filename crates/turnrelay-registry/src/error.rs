//! Error types for the registry layer.

use turnrelay_protocol::ClientId;

/// Errors that can occur while allocating or looking up client slots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Every usable slot is taken. The new peer gets no acknowledgement.
    #[error("registry full ({capacity} slots)")]
    Full { capacity: u32 },

    /// The id is reserved, out of range, or its slot is free.
    /// This happens when a peer sends records for an id it was never
    /// given, or one that has already been terminated.
    #[error("client {0} not found")]
    NotFound(ClientId),
}
