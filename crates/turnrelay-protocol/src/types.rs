//! Core protocol types for turnrelay's wire format.
//!
//! These are the decoded forms of the records that travel over the socket.
//! Inbound records become [`Event`]s, outbound replies are
//! [`ServerMessage`]s.

use std::fmt;

// ---------------------------------------------------------------------------
// Control tokens
// ---------------------------------------------------------------------------

/// The handshake record. Sent alone, without an id.
pub const BEGIN_TOKEN: &[u8] = b"BEGIN";

/// Payload that ends a session: `<id>:END`.
pub const END_TOKEN: &[u8] = b"END";

/// Payload that rebinds an id to the current connection: `<id>:RECONNECT`.
pub const RECONNECT_TOKEN: &[u8] = b"RECONNECT";

/// Separates the client id from the payload.
pub const SEPARATOR: u8 = b':';

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a registry slot, handed to a peer in its handshake
/// acknowledgement.
///
/// A "newtype wrapper" around `u32`: a `ClientId` can't be confused with a
/// connection id or a byte count. Id `0` is reserved and never names a real
/// client; the registry never allocates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl ClientId {
    /// The reserved "no client" id.
    pub const RESERVED: ClientId = ClientId(0);

    /// Returns the raw id as written on the wire.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Slot index for table lookups.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side assigned at pairing time. The first peer to arrive plays White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// The color name used in handshake acknowledgements.
    pub fn wire_name(self) -> &'static str {
        match self {
            Color::White => "WHITE",
            Color::Black => "BLACK",
        }
    }

    /// Parses a wire color name.
    pub fn from_wire(name: &[u8]) -> Option<Color> {
        match name {
            b"WHITE" => Some(Color::White),
            b"BLACK" => Some(Color::Black),
            _ => None,
        }
    }

    /// The other side.
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Inbound: Event
// ---------------------------------------------------------------------------

/// A decoded client → server record.
///
/// ```text
/// BEGIN             → Event::Handshake
/// <id>:END          → Event::Terminate
/// <id>:RECONNECT    → Event::Reconnect
/// <id>:<payload>    → Event::Move
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A brand-new peer asks to be registered and paired.
    Handshake,

    /// The peer is done with its session.
    Terminate { client_id: ClientId },

    /// The peer is back on a new connection and wants its id rebound.
    Reconnect { client_id: ClientId },

    /// An opaque turn payload for the sender's opponent.
    ///
    /// Never empty and never equal to `END` or `RECONNECT`.
    Move { client_id: ClientId, payload: Vec<u8> },
}

impl Event {
    /// The id the record claims to come from, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Event::Handshake => None,
            Event::Terminate { client_id }
            | Event::Reconnect { client_id }
            | Event::Move { client_id, .. } => Some(*client_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound: ServerMessage
// ---------------------------------------------------------------------------

/// A server → client record, before framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `<id>:<WHITE|BLACK>`: sent to both peers once they are paired.
    HandshakeAck { client_id: ClientId, color: Color },

    /// The opponent's payload, forwarded byte-for-byte.
    Relay(Vec<u8>),

    /// `END`: the opponent terminated. Only sent when the relay is
    /// configured to notify survivors.
    OpponentEnded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_display_is_bare_number() {
        assert_eq!(ClientId(17).to_string(), "17");
    }

    #[test]
    fn test_color_wire_names_round_trip() {
        for color in [Color::White, Color::Black] {
            assert_eq!(Color::from_wire(color.wire_name().as_bytes()), Some(color));
        }
        assert_eq!(Color::from_wire(b"RED"), None);
    }

    #[test]
    fn test_color_opponent_flips() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::Black.opponent(), Color::White);
    }

    #[test]
    fn test_event_client_id() {
        assert_eq!(Event::Handshake.client_id(), None);
        let ev = Event::Move {
            client_id: ClientId(3),
            payload: b"e2e4".to_vec(),
        };
        assert_eq!(ev.client_id(), Some(ClientId(3)));
    }
}
