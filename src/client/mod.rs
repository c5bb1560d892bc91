use std::time::Duration;

use clap::Parser;

pub mod client;
pub mod main;

/// How often the client pings the controller
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long one join attempt waits for a JOIN_RESPONSE
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Join attempts before giving up
pub const JOIN_ATTEMPTS: u32 = 3;

/// Default TUN MTU
///
/// Small enough that a datagram plus the 24-byte packet header plus the
/// 28-byte AEAD envelope stays inside the 1400-byte datagram budget.
pub const DEFAULT_MTU: u16 = 1340;

/// Meshtun overlay client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Controller address (e.g., 203.0.113.1:9993)
    #[arg(short, long)]
    pub controller: String,

    /// Network id: 16 bytes as 32 hex chars
    #[arg(short, long)]
    pub network_id: String,

    /// Member id (random if not given)
    #[arg(long)]
    pub id: Option<u64>,

    /// Data-path cipher: plain or chacha20
    #[arg(long, default_value = "plain")]
    pub crypto: String,

    /// Persist the long-term keypair at this path
    #[arg(long)]
    pub keypair: Option<String>,

    /// Local UDP port (0 = ephemeral)
    #[arg(long, default_value = "0")]
    pub port: u16,
}
