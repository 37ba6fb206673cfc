/// Errors that can occur in the transport layer.
///
/// Only listener-level failures are represented here. Failures on an
/// individual client connection are reported through
/// [`ReadOutcome`](crate::ReadOutcome) or a plain `std::io::Error` and are
/// always handled locally by the event loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// The listener failed in a way that retrying will not fix.
    ///
    /// This is the one fatal condition of the readiness loop.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The connection is not (or no longer) part of the socket set.
    #[error("connection closed: {0}")]
    Closed(crate::ConnectionId),
}
