//! Error types for the matchmaking layer.

use turnrelay_protocol::{ClientId, ProtocolError};
use turnrelay_registry::RegistryError;

/// Why an inbound record was dropped.
///
/// None of these are fatal: the event loop logs them and keeps the
/// connection open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The record could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Allocation or lookup failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A move arrived from a client that has nobody to send it to.
    #[error("client {0} has no opponent")]
    NotPaired(ClientId),

    /// `BEGIN` on a connection that already speaks for a client.
    #[error("connection already registered as client {0}")]
    AlreadyRegistered(ClientId),
}
