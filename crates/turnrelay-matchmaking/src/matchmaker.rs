//! The pairing and relay state machine.

use turnrelay_protocol::{
    ClientId, Codec, Color, Event, ServerMessage, TextCodec, frame,
};
use turnrelay_registry::{Registry, SlotState};
use turnrelay_transport::ConnectionId;

use crate::{MatchConfig, MatchError, OrphanPolicy};

/// A side effect the event loop must carry out after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// The connection's owner has bytes waiting: enable write interest.
    WantWrite(ConnectionId),

    /// Drop the connection.
    Close(ConnectionId),
}

/// Pairs peers and relays their moves.
///
/// Owns the [`Registry`] and remembers at most one unmatched record in
/// `awaiting`. All mutation goes through [`apply`](Self::apply) and
/// [`connection_closed`](Self::connection_closed), which the event loop
/// calls from its single task.
///
/// ## Pairing
///
/// ```text
/// BEGIN (A) → A: Waiting, White, awaiting = A
/// BEGIN (B) → B: Black; A ⇄ B Paired; both acks queued; awaiting = None
/// ```
pub struct Matchmaker<C: Codec = TextCodec> {
    registry: Registry,
    codec: C,
    awaiting: Option<ClientId>,
    config: MatchConfig,
}

impl Matchmaker<TextCodec> {
    /// Creates a matchmaker speaking the text protocol.
    pub fn new(config: MatchConfig) -> Self {
        Self::with_codec(TextCodec::new(config.capacity), config)
    }
}

impl<C: Codec> Matchmaker<C> {
    /// Creates a matchmaker with a custom codec.
    pub fn with_codec(codec: C, config: MatchConfig) -> Self {
        Self {
            registry: Registry::new(config.capacity),
            codec,
            awaiting: None,
            config,
        }
    }

    /// Decodes one record and applies it.
    ///
    /// A record that fails to decode changes nothing.
    pub fn handle_record(
        &mut self,
        conn: ConnectionId,
        record: &[u8],
    ) -> Result<Vec<Directive>, MatchError> {
        let event = self.codec.decode(record)?;
        self.apply(conn, event)
    }

    /// Applies a decoded event that arrived on `conn`.
    ///
    /// # Errors
    /// The event is dropped and the returned error says why. Nothing is
    /// half-applied: every check that can fail runs before the first
    /// mutation, except where noted on the individual handlers.
    pub fn apply(
        &mut self,
        conn: ConnectionId,
        event: Event,
    ) -> Result<Vec<Directive>, MatchError> {
        match event {
            Event::Handshake => self.handshake(conn),
            Event::Terminate { client_id } => self.terminate(conn, client_id),
            Event::Reconnect { client_id } => self.reconnect(conn, client_id),
            Event::Move { client_id, payload } => {
                self.relay(conn, client_id, payload)
            }
        }
    }

    /// The connection is gone: unbind it from its owner, if any.
    ///
    /// A paired owner keeps its slot, so moves sent to it while it is away
    /// wait in its outbox. If the owner was the waiting record it leaves
    /// matchmaking and the orphan policy decides whether it survives. An
    /// owner whose opponent already terminated has nothing left to come
    /// back to, so its slot is freed.
    pub fn connection_closed(&mut self, conn: ConnectionId) -> Option<ClientId> {
        let owner = self.registry.unbind(conn)?;
        tracing::debug!(%conn, client_id = %owner, "connection unbound");
        self.detached(owner);
        Some(owner)
    }

    /// The record waiting for an opponent, if any.
    pub fn awaiting(&self) -> Option<ClientId> {
        self.awaiting
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access for the event loop's flushes.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------

    fn handshake(&mut self, conn: ConnectionId) -> Result<Vec<Directive>, MatchError> {
        if let Some(owner) = self.registry.lookup_by_connection(conn) {
            return Err(MatchError::AlreadyRegistered(owner));
        }
        let id = self.registry.allocate()?;
        self.registry.bind(id, conn)?;
        tracing::info!(%conn, client_id = %id, "client registered");
        self.enter_matchmaking(id)
    }

    fn terminate(
        &mut self,
        conn: ConnectionId,
        id: ClientId,
    ) -> Result<Vec<Directive>, MatchError> {
        let old = self.registry.release(id)?;
        if self.awaiting == Some(id) {
            self.awaiting = None;
        }
        tracing::info!(%conn, client_id = %id, "client terminated");

        let mut directives = Vec::new();
        if let Some(survivor) = old.opponent {
            if self.unlink(survivor, id) {
                if self.config.notify_on_end {
                    if let Some(target) = self.queue(survivor, &ServerMessage::OpponentEnded)? {
                        directives.push(Directive::WantWrite(target));
                    }
                }
                let offline = self
                    .registry
                    .lookup(survivor)
                    .is_ok_and(|record| record.connection().is_none());
                // Retained offline survivors can still reconnect to collect
                // the notice; closing that connection frees them.
                if offline && self.config.orphan_policy == OrphanPolicy::Release {
                    self.release_finished(survivor);
                }
            }
        }
        directives.push(Directive::Close(conn));
        Ok(directives)
    }

    fn reconnect(
        &mut self,
        conn: ConnectionId,
        id: ClientId,
    ) -> Result<Vec<Directive>, MatchError> {
        self.rebind(id, conn)?;
        let record = self.registry.lookup(id)?;
        tracing::info!(%conn, client_id = %id, state = ?record.state, "client reconnected");

        if record.state == SlotState::Orphaned && !record.was_paired {
            // Never told its color by a pairing: back into the queue.
            return self.enter_matchmaking(id);
        }
        Ok(vec![Directive::WantWrite(conn)])
    }

    fn relay(
        &mut self,
        conn: ConnectionId,
        id: ClientId,
        payload: Vec<u8>,
    ) -> Result<Vec<Directive>, MatchError> {
        self.rebind(id, conn)?;
        // The rebind above sticks even if the sender turns out to be
        // unpaired.
        let opponent = self
            .registry
            .lookup(id)?
            .opponent
            .ok_or(MatchError::NotPaired(id))?;

        let len = payload.len();
        match self.queue(opponent, &ServerMessage::Relay(payload))? {
            Some(target) => {
                tracing::debug!(from = %id, to = %opponent, len, "move relayed");
                Ok(vec![Directive::WantWrite(target)])
            }
            None => {
                tracing::debug!(from = %id, to = %opponent, len, "opponent offline, move held");
                Ok(Vec::new())
            }
        }
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    /// Makes `id` the waiting record, or pairs it with the current one.
    fn enter_matchmaking(&mut self, id: ClientId) -> Result<Vec<Directive>, MatchError> {
        let partner = self
            .awaiting
            .take()
            .filter(|&waiting| waiting != id && self.registry.lookup(waiting).is_ok());

        let Some(white) = partner else {
            let record = self.registry.lookup_mut(id)?;
            record.state = SlotState::Waiting;
            record.color = Some(Color::White);
            record.opponent = None;
            self.awaiting = Some(id);
            // Delivered once the pairing enables write interest.
            self.queue_ack(id, Color::White)?;
            tracing::info!(client_id = %id, "waiting for an opponent");
            return Ok(Vec::new());
        };

        let black = id;
        for (me, other, color) in [(white, black, Color::White), (black, white, Color::Black)] {
            let record = self.registry.lookup_mut(me)?;
            record.opponent = Some(other);
            record.color = Some(color);
            record.state = SlotState::Paired;
            record.was_paired = true;
        }
        self.queue_ack(black, Color::Black)?;
        tracing::info!(%white, %black, "clients paired");

        let directives = [white, black]
            .into_iter()
            .filter_map(|id| self.registry.lookup(id).ok()?.connection())
            .map(Directive::WantWrite)
            .collect();
        Ok(directives)
    }

    /// Binds `conn` to `id`; a record that loses `conn` to another id is
    /// treated as if its connection had closed.
    fn rebind(&mut self, id: ClientId, conn: ConnectionId) -> Result<(), MatchError> {
        if let Some(previous) = self.registry.bind(id, conn)? {
            self.detached(previous);
        }
        Ok(())
    }

    /// `id` just lost its connection.
    fn detached(&mut self, id: ClientId) {
        if self.awaiting == Some(id) {
            self.orphan_waiting(id);
        } else if self.session_over(id) {
            self.release_finished(id);
        }
    }

    /// Paired once, opponent since terminated.
    fn session_over(&self, id: ClientId) -> bool {
        self.registry.lookup(id).is_ok_and(|record| {
            record.state == SlotState::Orphaned
                && record.was_paired
                && record.opponent.is_none()
        })
    }

    fn release_finished(&mut self, id: ClientId) {
        if self.registry.release(id).is_ok() {
            tracing::info!(client_id = %id, "session over, slot released");
        }
    }

    /// Takes the waiting record out of matchmaking.
    fn orphan_waiting(&mut self, id: ClientId) {
        self.awaiting = None;
        match self.config.orphan_policy {
            OrphanPolicy::Retain => {
                if let Ok(record) = self.registry.lookup_mut(id) {
                    record.state = SlotState::Orphaned;
                }
                tracing::info!(client_id = %id, "waiting client orphaned");
            }
            OrphanPolicy::Release => {
                // Not finding it is fine: it is already free.
                let _ = self.registry.release(id);
                tracing::info!(client_id = %id, "waiting client released");
            }
        }
    }

    /// Detaches `survivor` from a terminated opponent. Returns false if
    /// `survivor` was not linked to `gone`.
    fn unlink(&mut self, survivor: ClientId, gone: ClientId) -> bool {
        let Ok(record) = self.registry.lookup_mut(survivor) else {
            return false;
        };
        if record.opponent != Some(gone) {
            return false;
        }
        record.opponent = None;
        record.state = SlotState::Orphaned;
        tracing::info!(client_id = %survivor, opponent = %gone, "opponent left");
        true
    }

    fn queue_ack(&mut self, id: ClientId, color: Color) -> Result<(), MatchError> {
        self.queue(id, &ServerMessage::HandshakeAck { client_id: id, color })?;
        Ok(())
    }

    /// Frames `message` into `id`'s outbox and returns its connection.
    fn queue(
        &mut self,
        id: ClientId,
        message: &ServerMessage,
    ) -> Result<Option<ConnectionId>, MatchError> {
        let bytes = frame(&self.codec.encode(message));
        let record = self.registry.lookup_mut(id)?;
        if record.outbox.replace(bytes) {
            tracing::debug!(client_id = %id, "undelivered message superseded");
        }
        Ok(record.connection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_handshake_first_client_waits_as_white() {
        let mut mm = Matchmaker::new(MatchConfig::default());

        let directives = mm.apply(conn(1), Event::Handshake).unwrap();

        assert!(directives.is_empty());
        assert_eq!(mm.awaiting(), Some(ClientId(1)));
        let record = mm.registry().lookup(ClientId(1)).unwrap();
        assert_eq!(record.state, SlotState::Waiting);
        assert_eq!(record.color, Some(Color::White));
        assert_eq!(record.outbox.remaining(), b"1:WHITE\n");
    }

    #[test]
    fn test_handshake_twice_on_one_connection_is_rejected() {
        let mut mm = Matchmaker::new(MatchConfig::default());
        mm.apply(conn(1), Event::Handshake).unwrap();

        assert_eq!(
            mm.apply(conn(1), Event::Handshake),
            Err(MatchError::AlreadyRegistered(ClientId(1)))
        );
        assert_eq!(mm.registry().allocated(), 1);
    }

    #[test]
    fn test_handle_record_garbage_is_protocol_error() {
        let mut mm = Matchmaker::new(MatchConfig::default());
        assert!(matches!(
            mm.handle_record(conn(1), b"garbage"),
            Err(MatchError::Protocol(_))
        ));
    }
}
