use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use ipnet::Ipv4Net;
use rand::Rng;

use crate::client::client::{ClientConfig, ClientHandler};
use crate::client::{Args, DEFAULT_MTU, KEEPALIVE_INTERVAL};
use crate::controller::config::parse_network_id;
use crate::crypto;
use crate::crypto::CryptoConfig;
use crate::crypto::keypair::Keypair;
use crate::utils;
use crate::utils::device::{DeviceConfig, DeviceHandler};
use crate::utils::sys_route::SysRoute;

pub async fn run_client() {
    let args = Args::parse();

    if let Err(e) = utils::init_tracing() {
        eprintln!("Failed to initialize logging: {}", e);
        return;
    }

    let network_id = match parse_network_id(&args.network_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    };

    let controller_addr = match args.controller.to_socket_addrs().map(|mut a| a.next()) {
        Ok(Some(addr)) => addr,
        _ => {
            tracing::error!("cannot resolve controller address {:?}", args.controller);
            std::process::exit(1);
        }
    };

    let crypto_config: CryptoConfig = match args.crypto.parse() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    // identity outlives the process only when a keypair path is given
    if let Some(path) = &args.keypair {
        match Keypair::load_or_generate(Path::new(path)) {
            Ok(keypair) => tracing::info!("public key {}", keypair.public_base64()),
            Err(e) => {
                tracing::error!("keypair: {}", e);
                std::process::exit(1);
            }
        }
    }

    let id = args.id.unwrap_or_else(|| rand::rng().random());
    tracing::info!("client id {}, controller {}", id, controller_addr);

    let cipher = Arc::new(crypto::new_cipher(&crypto_config));
    let mut handler = match ClientHandler::new(
        ClientConfig {
            controller_addr,
            network_id,
            id,
            bind_port: args.port,
            keepalive_interval: KEEPALIVE_INTERVAL,
        },
        cipher,
    )
    .await
    {
        Ok(handler) => handler,
        Err(e) => {
            tracing::error!("client startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let virtual_ip = match handler.join().await {
        Ok(vip) => vip,
        Err(e) => {
            tracing::error!("join failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut device = DeviceHandler::new();
    let interface = match device
        .run(DeviceConfig {
            ip: virtual_ip.to_string(),
            mask: "255.255.255.0".to_string(),
            mtu: DEFAULT_MTU,
        })
        .await
    {
        Ok(name) => name,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    // route the whole overlay through the new interface
    let subnet = Ipv4Net::new(virtual_ip, 24).map(|n| n.trunc());
    match subnet {
        Ok(subnet) => {
            if let Err(e) = SysRoute::new().add(&subnet.to_string(), &interface) {
                tracing::warn!("route install failed: {}", e);
            }
        }
        Err(e) => tracing::warn!("cannot derive overlay subnet: {}", e),
    }

    if let Err(e) = handler.run(&mut device).await {
        tracing::error!("client error: {}", e);
    }
}
