//! `RelayServer` builder and the event loop.
//!
//! This is the entry point for running a relay. It ties together all the
//! layers: transport → protocol → registry → matchmaking.

use std::net::SocketAddr;
use std::time::Duration;

use turnrelay_matchmaking::OrphanPolicy;
use turnrelay_transport::SocketSet;

use crate::handler::Dispatcher;
use crate::{RelayConfig, TurnRelayError};

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,no_run
/// use turnrelay::RelayServer;
///
/// # async fn start() -> Result<(), turnrelay::TurnRelayError> {
/// let server = RelayServer::builder()
///     .host("127.0.0.1")
///     .port(4000)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RelayServerBuilder {
    config: RelayConfig,
}

impl RelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
        }
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the interface to bind to.
    pub fn host(mut self, host: &str) -> Self {
        self.config.bind_host = host.to_string();
        self
    }

    /// Sets the port to listen on.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the number of registry slots.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sets the bound on one readiness wait.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = timeout;
        self
    }

    pub fn orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.config.orphan_policy = policy;
        self
    }

    pub fn notify_on_end(mut self, notify: bool) -> Self {
        self.config.notify_on_end = notify;
        self
    }

    /// Sets how many bytes one readable wakeup reads at most.
    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.config.read_chunk = bytes;
        self
    }

    /// Sets the longest accepted record, newline excluded.
    pub fn max_record_len(mut self, bytes: usize) -> Self {
        self.config.max_record_len = bytes;
        self
    }

    /// Binds the listener.
    pub async fn build(self) -> Result<RelayServer, TurnRelayError> {
        RelayServer::bind(self.config).await
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay.
///
/// Call [`run()`](Self::run) to start serving peers.
pub struct RelayServer {
    sockets: SocketSet,
    dispatcher: Dispatcher,
    config: RelayConfig,
}

impl RelayServer {
    /// Creates a new builder.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Binds the listening socket described by `config`.
    ///
    /// # Errors
    /// [`TransportError::Bind`](turnrelay_transport::TransportError::Bind)
    /// when the address is unusable or taken.
    pub async fn bind(config: RelayConfig) -> Result<Self, TurnRelayError> {
        let sockets = SocketSet::bind(&config.bind_addr()).await?;
        Ok(Self {
            sockets,
            dispatcher: Dispatcher::new(&config),
            config,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.sockets.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs the event loop.
    ///
    /// Every iteration waits for readiness, then handles each wakeup to
    /// completion before waiting again. Runs until the listener fails in a
    /// way that cannot be retried; the caller decides about shutdown by
    /// dropping the future.
    pub async fn run(mut self) -> Result<(), TurnRelayError> {
        tracing::info!(
            capacity = self.config.capacity,
            orphan_policy = ?self.config.orphan_policy,
            "turnrelay running"
        );

        loop {
            let wakeups = self.sockets.wait(self.config.wait_timeout).await?;

            if wakeups.is_empty() {
                let registry = self.dispatcher.matchmaker().registry();
                tracing::info!(
                    connections = self.sockets.len(),
                    clients = registry.allocated(),
                    "still alive, nothing to do"
                );
                continue;
            }

            for wakeup in wakeups {
                self.dispatcher.handle(&mut self.sockets, wakeup);
            }
        }
    }
}
