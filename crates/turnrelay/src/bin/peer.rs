//! `turnrelay-peer`: an interactive terminal peer.
//!
//! Pairs through the relay, then alternates turns: on your turn a line
//! from stdin is sent as the move, on your opponent's turn their move is
//! printed. White moves first. An empty line or end of input ends the
//! session.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use turnrelay::{ClientConfig, RelayClient, TurnRelayError};
use turnrelay_protocol::{Color, END_TOKEN};

#[derive(Parser, Debug)]
#[command(name = "turnrelay-peer", version, about)]
struct Args {
    /// Relay address
    #[arg(default_value = "127.0.0.1:1234")]
    addr: String,

    /// Seconds to keep redialling after losing the relay
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Seconds between redial attempts
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        addr: args.addr,
        timeout: Duration::from_secs(args.timeout_secs),
        interval: Duration::from_secs(args.interval_secs),
    };

    match play(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn play(config: ClientConfig) -> Result<(), TurnRelayError> {
    let mut client = RelayClient::connect(config).await?;
    println!("waiting for an opponent...");
    let (id, color) = client.handshake().await?;
    println!("you are client {id}, playing {color}");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut my_turn = color == Color::White;

    loop {
        if my_turn {
            println!("your move:");
            let line = stdin.next_line().await?.unwrap_or_default();
            let line = line.trim();
            if line.is_empty() {
                println!("ending the session");
                return client.end().await;
            }
            if let Err(e) = client.send_move(line.as_bytes()).await {
                tracing::warn!(error = %e, "send failed, reconnecting");
                client.reconnect().await?;
                client.send_move(line.as_bytes()).await?;
            }
        } else {
            println!("waiting for {}...", color.opponent());
            let payload = match client.recv().await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "lost the relay, reconnecting");
                    client.reconnect().await?;
                    client.recv().await?
                }
            };
            if payload == END_TOKEN {
                println!("your opponent left");
                return client.end().await;
            }
            println!("{} played: {}", color.opponent(), String::from_utf8_lossy(&payload));
        }
        my_turn = !my_turn;
    }
}
