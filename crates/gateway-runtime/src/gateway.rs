//! # Gateway
//!
//! Owns the UDP socket and wires the layers together:
//!
//! ```text
//! datagram → SessionEngine → (replies back to peer)
//!                          → decrypted payloads → MessageExchange (task per payload)
//!                                                   → ResourceDispatcher → AccessControlResource
//! responses ← SecureSink (encrypt, send_to) ←───────┘
//! ```
//!
//! A periodic sweep closes timed-out sessions and expires dedup state.
//! On shutdown every established peer gets a close_notify.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gw_01_secure_session::{
    InMemoryPskStore, SecureTransport, SessionEngine, SessionEvent, SystemTimeSource,
};
use gw_02_message_exchange::MessageExchange;
use gw_03_access_control::{gateway_dispatcher, AccessAuthority, HttpAccessAuthority};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::sink::SecureSink;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct Gateway {
    config: GatewayConfig,
    socket: Arc<UdpSocket>,
    engine: Arc<SessionEngine>,
    exchange: Arc<MessageExchange>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Gateway {
    /// Bind the secure port and forward to the configured HTTP authority.
    pub async fn bind(config: GatewayConfig) -> Result<Self> {
        let authority = HttpAccessAuthority::new(
            config.upstream.base_url.clone(),
            config.upstream_timeout(),
        )
        .context("Failed to build upstream client")?;
        Self::bind_with_authority(config, Arc::new(authority)).await
    }

    /// Bind the secure port with a caller-supplied authority.
    pub async fn bind_with_authority(
        config: GatewayConfig,
        authority: Arc<dyn AccessAuthority>,
    ) -> Result<Self> {
        config
            .validate_components()
            .context("Invalid configuration")?;

        let store = InMemoryPskStore::with_entries(config.psk_entries()?)
            .context("Failed to provision PSK identities")?;
        let engine = Arc::new(SessionEngine::new(
            config.engine_config(),
            Arc::new(store),
            Arc::new(SystemTimeSource),
        ));

        let socket = Arc::new(
            UdpSocket::bind(config.bind_addr())
                .await
                .with_context(|| format!("Failed to bind {}", config.bind_addr()))?,
        );

        let dispatcher = gateway_dispatcher(authority, config.access_control.malformed_payload);
        let sink = SecureSink::new(Arc::clone(&socket), Arc::clone(&engine));
        let exchange = Arc::new(MessageExchange::new(
            config.exchange_config(),
            Arc::new(dispatcher),
            Arc::new(sink),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            socket,
            engine,
            exchange,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().context("Socket has no local address")
    }

    /// Send `true` to stop [`run`](Self::run).
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub fn engine(&self) -> Arc<SessionEngine> {
        Arc::clone(&self.engine)
    }

    /// Serve until shutdown is signalled.
    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.shutdown_rx.clone();
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        let mut buf = vec![0u8; self.config.network.max_datagram_size];

        info!(
            addr = %self.local_addr()?,
            suites = ?self.config.cipher_suites().as_slice(),
            identities = self.config.psk.identities.len(),
            upstream = %self.config.upstream.base_url,
            "gateway listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sweep.tick() => self.sweep(),
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.on_datagram(peer, &buf[..len]).await,
                    Err(err) => warn!(error = %err, "receive failed"),
                },
            }
        }

        self.close_all().await;
        info!("gateway stopped");
        Ok(())
    }

    async fn on_datagram(&self, peer: SocketAddr, datagram: &[u8]) {
        let output = self.engine.handle_datagram(peer, datagram);

        for reply in &output.replies {
            if let Err(err) = self.socket.send_to(reply, peer).await {
                warn!(%peer, error = %err, "send failed");
            }
        }

        for event in &output.events {
            if let SessionEvent::Closed { peer, .. } = event {
                self.exchange.forget_peer(*peer);
            }
        }

        if let Some(delivered) = output.delivered {
            for payload in delivered.payloads {
                let exchange = Arc::clone(&self.exchange);
                let session = delivered.session;
                tokio::spawn(async move {
                    exchange.on_datagram(peer, session, &payload).await;
                });
            }
        }
    }

    fn sweep(&self) {
        for (peer, reason) in self.engine.sweep() {
            debug!(%peer, %reason, "swept session");
            self.exchange.forget_peer(peer);
        }
        let purged = self.exchange.purge_expired();
        if purged > 0 {
            debug!(purged, "expired exchanges purged");
        }
    }

    async fn close_all(&self) {
        let notices = self.engine.close_all();
        info!(sessions = notices.len(), "closing sessions");
        for (peer, datagram) in notices {
            self.exchange.forget_peer(peer);
            if let Err(err) = self.socket.send_to(&datagram, peer).await {
                debug!(%peer, error = %err, "close_notify not sent");
            }
        }
    }
}
