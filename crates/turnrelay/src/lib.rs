//! # turnrelay
//!
//! A TCP relay that pairs peers two at a time and forwards opaque turn
//! payloads between them, surviving reconnects.
//!
//! Everything runs on one task: a readiness loop over all sockets drives
//! a matchmaking state machine, which never blocks and never touches a
//! socket itself.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turnrelay::prelude::*;
//!
//! # async fn start() -> Result<(), TurnRelayError> {
//! let server = RelayServer::builder().port(1234).build().await?;
//! server.run().await
//! # }
//! ```

pub mod client;
mod config;
mod error;
mod handler;
mod server;

pub use client::{ClientConfig, RelayClient};
pub use config::{Cli, DEFAULT_PORT, MAX_CAPACITY, RelayConfig};
pub use error::TurnRelayError;
pub use server::{RelayServer, RelayServerBuilder};

/// Everything needed to run or talk to a relay.
pub mod prelude {
    pub use crate::client::{ClientConfig, RelayClient};
    pub use crate::config::RelayConfig;
    pub use crate::error::TurnRelayError;
    pub use crate::server::{RelayServer, RelayServerBuilder};
    pub use turnrelay_matchmaking::OrphanPolicy;
    pub use turnrelay_protocol::{ClientId, Color};
}
