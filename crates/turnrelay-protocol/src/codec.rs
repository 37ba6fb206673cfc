//! Codec trait and the text codec used on the wire.
//!
//! A "codec" (coder/decoder) converts between single records and their
//! structured form. It never sees partial records: cutting the byte stream
//! into records is the [`LineFramer`](crate::LineFramer)'s job, so a codec
//! can assume it is handed exactly one record without its trailing newline.

use crate::{
    BEGIN_TOKEN, ClientId, Color, END_TOKEN, Event, ProtocolError,
    RECONNECT_TOKEN, SEPARATOR, ServerMessage,
};

/// Converts inbound records to [`Event`]s and [`ServerMessage`]s to bytes.
///
/// ## Trait bounds
///
/// - `Send + Sync` → the codec can live inside the server task that Tokio
///   may move between threads.
/// - `'static` → it owns everything it needs.
pub trait Codec: Send + Sync + 'static {
    /// Parses one record (no trailing newline).
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] describing why the record was rejected.
    /// A rejected record must never cause any state change.
    fn decode(&self, record: &[u8]) -> Result<Event, ProtocolError>;

    /// Formats one outbound record (no trailing newline).
    fn encode(&self, message: &ServerMessage) -> Vec<u8>;
}

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// The `<id>:<payload>` text codec.
///
/// The codec knows the registry capacity so that ids which could never name
/// a slot are rejected at the door instead of reaching the registry.
///
/// ## Example
///
/// ```rust
/// use turnrelay_protocol::{ClientId, Codec, Event, TextCodec};
///
/// let codec = TextCodec::new(100);
///
/// let event = codec.decode(b"7:e2e4").unwrap();
/// assert_eq!(
///     event,
///     Event::Move { client_id: ClientId(7), payload: b"e2e4".to_vec() },
/// );
/// assert!(codec.decode(b"garbage").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextCodec {
    capacity: u32,
}

impl TextCodec {
    /// Creates a codec that accepts ids in `0..capacity`.
    pub fn new(capacity: u32) -> Self {
        Self { capacity }
    }

    /// Returns the id bound this codec enforces.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn parse_id(&self, digits: &[u8]) -> Result<ClientId, ProtocolError> {
        let id = parse_digits(digits)?;
        match id {
            Some(id) if id < u64::from(self.capacity) => {
                // `capacity` is a u32, so anything below it fits.
                Ok(ClientId(id as u32))
            }
            id => Err(ProtocolError::IdOutOfRange {
                id,
                capacity: self.capacity,
            }),
        }
    }

    /// Formats a client → server record. Used by peers, not by the relay.
    pub fn encode_event(event: &Event) -> Vec<u8> {
        let with_id = |id: ClientId, payload: &[u8]| {
            let mut out = id.to_string().into_bytes();
            out.push(SEPARATOR);
            out.extend_from_slice(payload);
            out
        };
        match event {
            Event::Handshake => BEGIN_TOKEN.to_vec(),
            Event::Terminate { client_id } => with_id(*client_id, END_TOKEN),
            Event::Reconnect { client_id } => {
                with_id(*client_id, RECONNECT_TOKEN)
            }
            Event::Move { client_id, payload } => with_id(*client_id, payload),
        }
    }

    /// Parses a `<id>:<WHITE|BLACK>` acknowledgement. Used by peers.
    ///
    /// # Errors
    /// Rejects records without a separator, with a non-numeric id, or with
    /// an unknown color name.
    pub fn decode_ack(record: &[u8]) -> Result<(ClientId, Color), ProtocolError> {
        let (digits, color) = split_record(record)?;
        let id = parse_digits(digits)?
            .and_then(|id| u32::try_from(id).ok())
            .ok_or(ProtocolError::IdOutOfRange {
                id: None,
                capacity: u32::MAX,
            })?;
        let color = Color::from_wire(color).ok_or_else(|| {
            ProtocolError::UnknownColor(String::from_utf8_lossy(color).into_owned())
        })?;
        Ok((ClientId(id), color))
    }
}

impl Codec for TextCodec {
    fn decode(&self, record: &[u8]) -> Result<Event, ProtocolError> {
        if record == BEGIN_TOKEN {
            return Ok(Event::Handshake);
        }

        let (digits, rest) = split_record(record)?;
        let client_id = self.parse_id(digits)?;

        // Only the first ':' separates; the payload keeps any others.
        match rest {
            [] => Err(ProtocolError::EmptyPayload(client_id.get())),
            END_TOKEN => Ok(Event::Terminate { client_id }),
            RECONNECT_TOKEN => Ok(Event::Reconnect { client_id }),
            payload => Ok(Event::Move {
                client_id,
                payload: payload.to_vec(),
            }),
        }
    }

    fn encode(&self, message: &ServerMessage) -> Vec<u8> {
        match message {
            ServerMessage::HandshakeAck { client_id, color } => {
                format!("{client_id}:{color}").into_bytes()
            }
            ServerMessage::Relay(payload) => payload.clone(),
            ServerMessage::OpponentEnded => END_TOKEN.to_vec(),
        }
    }
}

fn split_record(record: &[u8]) -> Result<(&[u8], &[u8]), ProtocolError> {
    let sep = record
        .iter()
        .position(|&b| b == SEPARATOR)
        .ok_or(ProtocolError::MissingSeparator)?;
    Ok((&record[..sep], &record[sep + 1..]))
}

/// Parses ASCII digits. `Ok(None)` means "numeric, but overflows u64".
fn parse_digits(digits: &[u8]) -> Result<Option<u64>, ProtocolError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::NonNumericId(
            String::from_utf8_lossy(digits).into_owned(),
        ));
    }
    Ok(digits.iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    }))
}
