//! Relay configuration and the command line that fills it in.

use std::time::Duration;

use clap::Parser;
use turnrelay_matchmaking::{MatchConfig, OrphanPolicy};
use turnrelay_protocol::DEFAULT_MAX_RECORD_LEN;
use turnrelay_registry::DEFAULT_CAPACITY;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 1234;

/// Largest `--capacity` the command line accepts. Every slot is allocated
/// up front.
pub const MAX_CAPACITY: u32 = 65_536;

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Everything the relay needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface to listen on.
    pub bind_host: String,

    /// Port to listen on. 0 lets the OS pick one.
    pub port: u16,

    /// Registry slots, including the reserved slot 0.
    pub capacity: u32,

    /// Upper bound on one readiness wait. An idle wait that runs out is
    /// logged and the loop waits again.
    pub wait_timeout: Duration,

    /// Bytes read per readable connection per wakeup.
    pub read_chunk: usize,

    /// Longest accepted record, excluding the newline.
    pub max_record_len: usize,

    pub orphan_policy: OrphanPolicy,

    /// Send `END` to the survivor when its opponent terminates.
    pub notify_on_end: bool,
}

impl RelayConfig {
    /// `host:port`, ready for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// The subset of settings the matchmaker cares about.
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            capacity: self.capacity,
            orphan_policy: self.orphan_policy,
            notify_on_end: self.notify_on_end,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            wait_timeout: Duration::from_secs(300),
            read_chunk: 256,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            orphan_policy: OrphanPolicy::Retain,
            notify_on_end: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Pairs two peers and relays their turns.
#[derive(Parser, Debug)]
#[command(name = "turnrelay", version, about)]
pub struct Cli {
    /// TCP port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Number of client slots (slot 0 is reserved)
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY,
          value_parser = clap::value_parser!(u32).range(2..=MAX_CAPACITY as i64))]
    pub capacity: u32,

    /// Seconds between idle liveness log lines
    #[arg(long, default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub wait_timeout_secs: u64,

    /// Free a waiting client's slot as soon as its connection drops
    #[arg(long)]
    pub release_orphans: bool,

    /// Tell a client when its opponent ends the session
    #[arg(long)]
    pub notify_on_end: bool,
}

impl Cli {
    /// Converts parsed arguments into a [`RelayConfig`].
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind_host: self.host,
            port: self.port,
            capacity: self.capacity,
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
            orphan_policy: if self.release_orphans {
                OrphanPolicy::Release
            } else {
                OrphanPolicy::Retain
            },
            notify_on_end: self.notify_on_end,
            ..RelayConfig::default()
        }
    }
}
