//! Matchmaking for turnrelay.
//!
//! The [`Matchmaker`] is the state machine the event loop feeds decoded
//! records into. It pairs peers two at a time, relays moves into the
//! opponent's outbox and rebinds ids to new connections on reconnect.
//!
//! It never touches a socket. Every call returns [`Directive`]s that tell
//! the event loop which connections now have bytes to write and which ones
//! should be dropped.
//!
//! # Key types
//!
//! - [`Matchmaker`] — owns the registry and the single waiting slot
//! - [`Directive`] — what the event loop must do after an event
//! - [`MatchConfig`] / [`OrphanPolicy`] — pairing knobs
//! - [`MatchError`] — why an event was dropped

mod config;
mod error;
mod matchmaker;

pub use config::{MatchConfig, OrphanPolicy};
pub use error::MatchError;
pub use matchmaker::{Directive, Matchmaker};
