//! TUN device endpoint
//!
//! The kernel-facing half of the data plane. A spawned task owns the
//! virtual interface and shuttles raw IPv4 datagrams over mpsc channels,
//! so the client loop never blocks on device IO and never sees platform
//! framing. The interface is configured (address, netmask, MTU, up) at
//! creation; the overlay route is the caller's business.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tun::AbstractDevice;

/// Read buffer for one TUN datagram
const TUN_BUFFER_SIZE: usize = 1500;

#[derive(Clone)]
pub struct DeviceConfig {
    pub ip: String,
    pub mask: String,
    pub mtu: u16,
}

pub struct Device {
    config: DeviceConfig,
    inbound_tx: mpsc::Sender<Vec<u8>>,
    outbound_rx: mpsc::Receiver<Vec<u8>>,
}

impl Device {
    pub fn new(
        config: DeviceConfig,
        inbound_tx: mpsc::Sender<Vec<u8>>,
        outbound_rx: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            config,
            inbound_tx,
            outbound_rx,
        }
    }

    pub async fn run(&mut self, ready: oneshot::Sender<Option<String>>) -> crate::Result<()> {
        let mut config = tun::Configuration::default();
        config
            .address(self.config.ip.clone())
            .netmask(self.config.mask.clone())
            .mtu(self.config.mtu)
            .up();

        #[cfg(target_os = "linux")]
        config.platform_config(|config| {
            config.ensure_root_privileges(true);
        });

        let mut dev = match tun::create_as_async(&config) {
            Ok(dev) => dev,
            Err(e) => {
                let _ = ready.send(None);
                return Err(e.into());
            }
        };

        let name = dev.tun_name().ok();
        let _ = ready.send(name);

        let mut buf = vec![0; TUN_BUFFER_SIZE];
        loop {
            tokio::select! {
                amount = dev.read(&mut buf) => {
                    let amount = match amount {
                        Ok(amount) => amount,
                        Err(e) => {
                            tracing::error!("read device fail: {:?}", e);
                            continue;
                        }
                    };
                    if let Err(e) = self.inbound_tx.send(buf[0..amount].to_vec()).await {
                        tracing::error!("device => loop fail: {}", e);
                    }
                }
                packet = self.outbound_rx.recv() => {
                    match packet {
                        Some(packet) => {
                            tracing::debug!("loop => device {} bytes", packet.len());
                            if let Err(e) = dev.write(packet.as_slice()).await {
                                tracing::error!("write device fail: {:?}", e);
                            }
                        }
                        // loop side dropped its sender, time to stop
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

/// Channel-facing handle the client loop holds
pub struct DeviceHandler {
    inbound_rx: Option<mpsc::Receiver<Vec<u8>>>,
    outbound_tx: Option<mpsc::Sender<Vec<u8>>>,
    pub rx_bytes: usize,
    pub tx_bytes: usize,
}

impl DeviceHandler {
    pub fn new() -> Self {
        Self {
            inbound_rx: None,
            outbound_tx: None,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }

    /// Creates the interface and starts its IO task
    ///
    /// Returns the kernel-assigned interface name once the device is up.
    /// Failure to open the device is fatal to the caller; it usually
    /// means missing privileges.
    pub async fn run(&mut self, cfg: DeviceConfig) -> crate::Result<String> {
        let (inbound_tx, inbound_rx) = mpsc::channel(1000);
        let (outbound_tx, outbound_rx) = mpsc::channel(1000);
        self.inbound_rx = Some(inbound_rx);
        self.outbound_tx = Some(outbound_tx);

        let mut dev = Device::new(cfg, inbound_tx, outbound_rx);
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(e) = dev.run(ready_tx).await {
                tracing::error!("device task fail: {:?}", e);
            }
        });

        match ready_rx.await {
            Ok(Some(name)) => {
                tracing::info!("tun device {} is up", name);
                Ok(name)
            }
            Ok(None) | Err(_) => Err("cannot open tun device (are you root?)".into()),
        }
    }

    /// Receives one IPv4 datagram read from the interface
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let inbound_rx = self.inbound_rx.as_mut()?;
        let result = inbound_rx.recv().await;
        if let Some(packet) = &result {
            self.rx_bytes += packet.len();
        }
        result
    }

    /// Hands one IPv4 datagram to the kernel via the interface
    pub async fn send(&mut self, packet: Vec<u8>) -> crate::Result<()> {
        let outbound_tx = match self.outbound_tx.as_ref() {
            Some(tx) => tx,
            None => {
                return Err("device not running".into());
            }
        };
        self.tx_bytes += packet.len();
        outbound_tx.send(packet).await?;
        Ok(())
    }
}

impl Default for DeviceHandler {
    fn default() -> Self {
        Self::new()
    }
}
