//! An async client for the relay protocol.
//!
//! Used by the `turnrelay-peer` binary and by the end-to-end tests. It
//! speaks the same newline-framed records as any other peer and has no
//! special standing with the relay.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use turnrelay_protocol::{ClientId, Color, Event, TextCodec, frame};

use crate::TurnRelayError;

/// Where the relay lives and how hard to try to get back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port` of the relay.
    pub addr: String,

    /// Give up redialling after this long.
    pub timeout: Duration,

    /// Pause between redial attempts.
    pub interval: Duration,
}

impl ClientConfig {
    /// Default timings for `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(5),
        }
    }
}

/// One peer's connection to the relay.
pub struct RelayClient {
    config: ClientConfig,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    id: Option<ClientId>,
    color: Option<Color>,
}

impl RelayClient {
    /// Dials the relay once.
    pub async fn connect(config: ClientConfig) -> Result<Self, TurnRelayError> {
        let stream = TcpStream::connect(&config.addr).await?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        Ok(Self {
            config,
            reader: BufReader::new(read),
            writer: write,
            id: None,
            color: None,
        })
    }

    /// Sends `BEGIN` and waits for the acknowledgement.
    ///
    /// The relay only answers once an opponent has shown up, so this can
    /// take as long as the matchmaking does.
    pub async fn handshake(&mut self) -> Result<(ClientId, Color), TurnRelayError> {
        self.send_event(&Event::Handshake).await?;
        let ack = self.recv().await?;
        let (id, color) = TextCodec::decode_ack(&ack)?;
        tracing::debug!(client_id = %id, %color, "handshake complete");
        self.id = Some(id);
        self.color = Some(color);
        Ok((id, color))
    }

    /// Sends a move for the opponent.
    pub async fn send_move(&mut self, payload: &[u8]) -> Result<(), TurnRelayError> {
        let client_id = self.id.ok_or(TurnRelayError::NotRegistered)?;
        self.send_event(&Event::Move {
            client_id,
            payload: payload.to_vec(),
        })
        .await
    }

    /// Waits for the next record from the relay, without its newline.
    pub async fn recv(&mut self) -> Result<Vec<u8>, TurnRelayError> {
        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line).await?;
        if n == 0 || line.last() != Some(&b'\n') {
            return Err(TurnRelayError::ConnectionClosed);
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Redials every `interval` until `timeout`, then reclaims the id with
    /// `<id>:RECONNECT`.
    pub async fn reconnect(&mut self) -> Result<(), TurnRelayError> {
        let client_id = self.id.ok_or(TurnRelayError::NotRegistered)?;
        let ClientConfig {
            addr,
            timeout,
            interval,
        } = self.config.clone();

        let redial = async {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                tracing::info!(%addr, "trying to reconnect");
                match TcpStream::connect(&addr).await {
                    Ok(stream) => break stream,
                    Err(e) => tracing::debug!(error = %e, "redial failed"),
                }
            }
        };
        let stream = tokio::time::timeout(timeout, redial)
            .await
            .map_err(|_| TurnRelayError::ReconnectTimedOut(timeout))?;
        stream.set_nodelay(true)?;

        let (read, write) = stream.into_split();
        self.reader = BufReader::new(read);
        self.writer = write;
        tracing::info!(client_id = %client_id, "reconnected");
        self.send_event(&Event::Reconnect { client_id }).await
    }

    /// Ends the session and closes the connection.
    pub async fn end(mut self) -> Result<(), TurnRelayError> {
        let client_id = self.id.ok_or(TurnRelayError::NotRegistered)?;
        self.send_event(&Event::Terminate { client_id }).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    /// The id assigned at handshake.
    pub fn id(&self) -> Option<ClientId> {
        self.id
    }

    /// The color assigned at handshake.
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    /// Writes an arbitrary record. Mostly useful for poking the relay with
    /// malformed input.
    pub async fn send_raw(&mut self, record: &[u8]) -> Result<(), TurnRelayError> {
        self.writer.write_all(&frame(record)).await?;
        Ok(())
    }

    async fn send_event(&mut self, event: &Event) -> Result<(), TurnRelayError> {
        self.send_raw(&TextCodec::encode_event(event)).await
    }
}
