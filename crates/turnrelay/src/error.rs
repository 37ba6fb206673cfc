//! Unified error type for turnrelay.

use turnrelay_matchmaking::MatchError;
use turnrelay_protocol::ProtocolError;
use turnrelay_registry::RegistryError;
use turnrelay_transport::TransportError;

/// Everything that can go wrong in the relay binary or in a peer.
///
/// The server side only ever surfaces `Transport`; the other layer errors
/// are per-record and logged by the dispatcher. `ConnectionClosed`,
/// `ReconnectTimedOut` and `NotRegistered` come from [`RelayClient`].
///
/// [`RelayClient`]: crate::RelayClient
#[derive(Debug, thiserror::Error)]
pub enum TurnRelayError {
    /// A transport-level error (bind, fatal accept failure).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A record that could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Allocation or lookup in the client registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The matchmaker dropped an event.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Socket I/O on the client side.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The relay closed the connection while a reply was expected.
    #[error("connection closed by relay")]
    ConnectionClosed,

    /// Redialling the relay did not succeed before the deadline.
    #[error("could not reach the relay within {0:?}")]
    ReconnectTimedOut(std::time::Duration),

    /// The client has no id yet; it must complete the handshake first.
    #[error("handshake not completed")]
    NotRegistered,
}

#[cfg(test)]
mod tests {
    use super::*;

    use turnrelay_protocol::ClientId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Bind(std::io::ErrorKind::AddrInUse.into());
        let relay_err: TurnRelayError = err.into();
        assert!(matches!(relay_err, TurnRelayError::Transport(_)));
        assert!(relay_err.to_string().contains("bind failed"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::MissingSeparator;
        let relay_err: TurnRelayError = err.into();
        assert!(matches!(relay_err, TurnRelayError::Protocol(_)));
    }

    #[test]
    fn test_from_registry_error() {
        let err = RegistryError::NotFound(ClientId(3));
        let relay_err: TurnRelayError = err.into();
        assert!(matches!(relay_err, TurnRelayError::Registry(_)));
        assert!(relay_err.to_string().contains('3'));
    }

    #[test]
    fn test_from_match_error() {
        let err = MatchError::NotPaired(ClientId(1));
        let relay_err: TurnRelayError = err.into();
        assert!(matches!(relay_err, TurnRelayError::Match(_)));
    }
}
