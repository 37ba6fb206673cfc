//! Client records: the data the relay keeps per participant slot.

use turnrelay_protocol::{ClientId, Color};
use turnrelay_transport::ConnectionId;

use crate::Outbox;

// ---------------------------------------------------------------------------
// SlotState
// ---------------------------------------------------------------------------

/// Lifecycle of a registry slot.
///
/// ```text
///            handshake                 second handshake
///   Free ───────────────→ Waiting ─────────────────────→ Paired
///    ↑                       │                              │
///    │                       │ socket closed                │ opponent
///    │                       ▼                              │ terminated
///    │                   Orphaned ←─────────────────────────┘
///    │                       │
///    └───── terminate ───────┴── (also from Waiting / Paired)
/// ```
///
/// Emptiness is always this explicit tag, never inferred from default field
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Unused. The only state `allocate` picks from.
    #[default]
    Free,
    /// The single unmatched peer, waiting for an opponent.
    Waiting,
    /// Linked to an opponent that links back.
    Paired,
    /// Still allocated, but with nobody to play against: either its socket
    /// closed while it was waiting, or its opponent terminated.
    Orphaned,
}

impl SlotState {
    /// Returns `true` for every state except `Free`.
    pub fn is_allocated(self) -> bool {
        !matches!(self, SlotState::Free)
    }
}

// ---------------------------------------------------------------------------
// ClientRecord
// ---------------------------------------------------------------------------

/// One participant slot.
///
/// The bound connection is private: it changes only through
/// [`Registry::bind`](crate::Registry::bind) and friends, which keep the
/// reverse index in sync.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    id: ClientId,
    pub(crate) connection: Option<ConnectionId>,

    /// The paired opponent, `None` until pairing.
    pub opponent: Option<ClientId>,

    /// Assigned at handshake (White) or pairing (Black).
    pub color: Option<Color>,

    /// Pending outgoing bytes for this client.
    pub outbox: Outbox,

    /// Messages fully delivered to this client. Diagnostic only.
    pub sent: u64,

    pub state: SlotState,

    /// Set the first time the record is paired. A record orphaned before
    /// ever being paired has not been told its color yet and may still
    /// re-enter matchmaking.
    pub was_paired: bool,
}

impl ClientRecord {
    /// A free slot with every field at its default.
    pub fn vacant(id: ClientId) -> Self {
        Self {
            id,
            connection: None,
            opponent: None,
            color: None,
            outbox: Outbox::new(),
            sent: 0,
            state: SlotState::Free,
            was_paired: false,
        }
    }

    /// This slot's id.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The connection currently speaking for this client.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }
}
