use std::fs;

use anyhow::Context;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::codec::packet::NETWORK_ID_SIZE;
use crate::crypto::CryptoConfig;
use crate::peers::MAX_PEERS;
use crate::transport::DEFAULT_PORT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub controller_config: ControllerConfig,

    #[serde(default)]
    pub crypto_config: CryptoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    // udp port the controller listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    // human-readable network label
    #[serde(default = "default_name")]
    pub name: String,

    // 16 bytes as 32 hex chars, shared by every member
    pub network_id: String,

    // overlay subnet, eg: 10.0.0.0/24
    #[serde(default = "default_subnet")]
    pub subnet: String,

    // member cap
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

fn default_listen_port() -> u16 {
    DEFAULT_PORT
}

fn default_name() -> String {
    "meshtun".to_string()
}

fn default_subnet() -> String {
    "10.0.0.0/24".to_string()
}

fn default_max_peers() -> usize {
    MAX_PEERS
}

impl ControllerConfig {
    /// Parses the `network_id` hex string into its 16-byte form
    pub fn network_id_bytes(&self) -> anyhow::Result<[u8; NETWORK_ID_SIZE]> {
        parse_network_id(&self.network_id)
    }

    /// Parses the `subnet` string into an [`Ipv4Net`]
    pub fn subnet(&self) -> anyhow::Result<Ipv4Net> {
        self.subnet
            .parse()
            .with_context(|| format!("invalid overlay subnet {:?}", self.subnet))
    }
}

/// Decodes a 32-hex-char network id
pub fn parse_network_id(s: &str) -> anyhow::Result<[u8; NETWORK_ID_SIZE]> {
    if !s.is_ascii() || s.len() != NETWORK_ID_SIZE * 2 {
        anyhow::bail!(
            "network id must be {} hex chars, got {:?}",
            NETWORK_ID_SIZE * 2,
            s
        );
    }
    let mut id = [0u8; NETWORK_ID_SIZE];
    for (i, byte) in id.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
            .with_context(|| format!("network id is not hex: {:?}", s))?;
    }
    Ok(id)
}

pub fn load(path: &str) -> anyhow::Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read config {:?}", path))?;
    let config: Config = toml::from_str(&content)?;
    config.controller_config.network_id_bytes()?;
    config.controller_config.subnet()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let cfg: Config = toml::from_str(
            r#"
            [controller_config]
            network_id = "00112233445566778899aabbccddeeff"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.controller_config.listen_port, DEFAULT_PORT);
        assert_eq!(cfg.controller_config.subnet, "10.0.0.0/24");
        assert_eq!(cfg.controller_config.max_peers, MAX_PEERS);
        assert_eq!(cfg.crypto_config, CryptoConfig::Plain);
        assert_eq!(
            cfg.controller_config.network_id_bytes().unwrap()[..4],
            [0x00, 0x11, 0x22, 0x33]
        );
    }

    #[test]
    fn test_parse_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            crypto_config = "chacha20"

            [controller_config]
            listen_port = 19993
            name = "lab"
            network_id = "ffffffffffffffffffffffffffffffff"
            subnet = "192.168.77.0/24"
            max_peers = 16
            "#,
        )
        .unwrap();

        assert_eq!(cfg.controller_config.listen_port, 19993);
        assert_eq!(cfg.crypto_config, CryptoConfig::ChaCha20);
        assert_eq!(
            cfg.controller_config.subnet().unwrap(),
            "192.168.77.0/24".parse::<Ipv4Net>().unwrap()
        );
    }

    #[test]
    fn test_network_id_rejects_bad_input() {
        assert!(parse_network_id("too short").is_err());
        assert!(parse_network_id("zz112233445566778899aabbccddeeff").is_err());
        assert!(parse_network_id("00112233445566778899aabbccddeeff").is_ok());
    }
}
