//! Admin CLI operations
//!
//! Talks the same packet protocol as the clients but never joins: it
//! binds an ephemeral port, asks its question and leaves.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::Rng;

use crate::codec::packet::{PacketType, PeerInfo};
use crate::transport::{DEFAULT_PORT, UdpTransport};

/// Quiet period after which a listing is considered lost
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Meshtun admin CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the controller's peer table
    List {
        /// Controller IP address
        controller_ip: String,

        /// Controller UDP port
        port: Option<u16>,
    },
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::List {
            controller_ip,
            port,
        } => {
            let addr: SocketAddr = format!("{}:{}", controller_ip, port.unwrap_or(DEFAULT_PORT))
                .parse()
                .map_err(|_| format!("invalid controller address {:?}", controller_ip))?;
            list(addr).await
        }
    }
}

/// Requests and prints the peer table, one line per member
pub async fn list(controller: SocketAddr) -> crate::Result<()> {
    let transport = UdpTransport::bind(0).await?;
    let id: u64 = rand::rng().random();
    transport
        .send(controller, PacketType::ListRequest, id, 0, &[])
        .await?;

    loop {
        let packet = match tokio::time::timeout(LIST_TIMEOUT, transport.recv()).await {
            Ok(Ok(packet)) => packet,
            Ok(Err(e)) => {
                tracing::debug!("dropping datagram: {}", e);
                continue;
            }
            Err(_) => return Err("no answer from controller".into()),
        };

        let (header, payload, _) = packet;
        match header.packet_type {
            PacketType::PeerInfo => match PeerInfo::decode(&payload) {
                Ok(info) => println!("{}", info),
                Err(e) => tracing::debug!("dropping peer info: {}", e),
            },
            PacketType::ListDone => return Ok(()),
            other => tracing::debug!("ignoring {}", other),
        }
    }
}
