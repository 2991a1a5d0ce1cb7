//! Compatibility and freshness checks applied to inbound handshake payloads.
//!
//! Validation is a single ordered pipeline, short-circuiting on the first
//! failure; each failure carries a distinct reason so rejections stay
//! observable locally even though they are silent on the wire. Everything is
//! pure except the read-only banlist lookup.

use crate::protocol::banlist::BanList;
use crate::protocol::config::ProtocolConfig;
use crate::protocol::identity;
use crate::protocol::message::HandshakePayload;
use thiserror::Error;
use tracing::debug;

/// Why a handshake payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("signature does not verify against the embedded public key")]
    InvalidSignature,

    #[error("peer id does not match the address of the embedded public key")]
    IdentityMismatch,

    #[error("peer is on a different network")]
    NetworkMismatch,

    #[error("peer network version is outside the supported range")]
    VersionUnsupported,

    #[error("payload timestamp is outside the freshness window")]
    StaleTimestamp,

    #[error("peer is banned")]
    PeerBanned,

    #[error("peer id equals our own identity")]
    SelfConnection,

    #[error("advertised port is not a valid TCP port")]
    InvalidPort,
}

/// Time source for timestamp generation and freshness checks. Injectable so
/// the pipeline is testable without touching the wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall-clock production implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Run the full validation pipeline over a decoded payload.
///
/// Check order: signature, identity binding, network, version range,
/// freshness, banlist, self-connection, advertised port.
pub async fn validate_payload(
    payload: &HandshakePayload,
    config: &ProtocolConfig,
    local_peer_id: &str,
    banlist: &dyn BanList,
    clock: &dyn Clock,
) -> Result<(), RejectReason> {
    if !payload.verify_signature() {
        return Err(RejectReason::InvalidSignature);
    }

    if payload.peer_id != identity::address_of(&payload.public_key) {
        return Err(RejectReason::IdentityMismatch);
    }

    if payload.network != config.network {
        return Err(RejectReason::NetworkMismatch);
    }

    if !config.supports_version(payload.network_version) {
        return Err(RejectReason::VersionUnsupported);
    }

    let now = clock.now_millis();
    if now.abs_diff(payload.timestamp) > config.timestamp_tolerance_ms {
        return Err(RejectReason::StaleTimestamp);
    }

    if banlist.is_banned(&payload.peer_id, &payload.ip).await {
        return Err(RejectReason::PeerBanned);
    }

    if payload.peer_id == local_peer_id {
        return Err(RejectReason::SelfConnection);
    }

    if payload.port == 0 {
        return Err(RejectReason::InvalidPort);
    }

    debug!(
        peer_id = %payload.peer_id,
        network = %payload.network,
        network_version = payload.network_version,
        "handshake payload validated"
    );

    Ok(())
}
