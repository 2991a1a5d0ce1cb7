//! Initiator client: opens a transport connection and drives the Hello/World
//! exchange, with retry handling for transient failures.

use crate::protocol::banlist::BanList;
use crate::protocol::config::ProtocolConfig;
use crate::protocol::handshake::{HandshakeError, Handshaker};
use crate::protocol::identity::NodeIdentity;
use crate::protocol::peer::Peer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, instrument, warn};

/// Default maximum handshake attempts per peer
const MAX_HANDSHAKE_RETRIES: u8 = 3;

/// High-level client for establishing outbound peers.
///
/// Every attempt uses a fresh connection: a handshake never retries on the
/// same connection, and a validation rejection is final for the peer.
pub struct HandshakeClient {
    handshaker: Handshaker,
    max_retries: u8,
}

impl HandshakeClient {
    pub fn new(
        identity: Arc<NodeIdentity>,
        config: Arc<ProtocolConfig>,
        banlist: Arc<dyn BanList>,
    ) -> Self {
        Self::with_config(identity, config, banlist, MAX_HANDSHAKE_RETRIES)
    }

    /// Create a client with a custom retry budget.
    pub fn with_config(
        identity: Arc<NodeIdentity>,
        config: Arc<ProtocolConfig>,
        banlist: Arc<dyn BanList>,
        max_retries: u8,
    ) -> Self {
        Self {
            handshaker: Handshaker::new(identity, config, banlist),
            max_retries,
        }
    }

    /// This node's own network-visible identity.
    pub fn local_peer_id(&self) -> &str {
        self.handshaker.local_peer_id()
    }

    /// Chain height advertised in outgoing Hello payloads.
    pub fn set_latest_block_number(&self, height: u64) {
        self.handshaker.set_latest_block_number(height)
    }

    /// Perform a handshake with a remote node, retrying transient failures
    /// with exponential backoff.
    #[instrument(skip(self))]
    pub async fn perform_handshake(&self, peer_addr: SocketAddr) -> Result<Peer, HandshakeError> {
        info!(%peer_addr, "starting handshake");

        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            debug!(
                %peer_addr,
                attempt,
                max_retries = self.max_retries,
                "handshake attempt"
            );

            match self.attempt_handshake(peer_addr).await {
                Ok(peer) => {
                    info!(
                        %peer_addr,
                        peer_id = %peer.peer_id,
                        attempt,
                        "handshake completed"
                    );
                    return Ok(peer);
                }
                Err(e) => {
                    warn!(%peer_addr, attempt, error = %e, "handshake attempt failed");

                    // Rejections and protocol violations are final; a fresh
                    // connection would only be rejected again.
                    if e.is_final() {
                        return Err(e);
                    }
                    last_error = Some(e);

                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(1 << (attempt - 1));
                        debug!(delay_secs = delay.as_secs(), "waiting before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(HandshakeError::RetriesExhausted {
            attempts: self.max_retries,
        }))
    }

    async fn attempt_handshake(&self, peer_addr: SocketAddr) -> Result<Peer, HandshakeError> {
        let deadline = self.handshaker.config().handshake_timeout;
        let mut stream = timeout(deadline, TcpStream::connect(peer_addr))
            .await
            .map_err(|_| HandshakeError::Timeout)??;

        // Advertise the address this connection actually originates from.
        let local = stream.local_addr()?;
        self.handshaker.initiate(&mut stream, local, peer_addr).await
    }

    /// Perform handshakes with several peers, returning per-peer results.
    #[instrument(skip(self, peer_addrs))]
    pub async fn perform_batch_handshakes(
        &self,
        peer_addrs: Vec<SocketAddr>,
    ) -> Vec<(SocketAddr, Result<Peer, HandshakeError>)> {
        info!(peer_count = peer_addrs.len(), "starting batch handshakes");

        let mut results = Vec::new();
        for peer_addr in peer_addrs {
            let result = self.perform_handshake(peer_addr).await;
            results.push((peer_addr, result));
        }

        let successful = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            total_peers = results.len(),
            successful_handshakes = successful,
            "batch handshakes completed"
        );

        results
    }
}
