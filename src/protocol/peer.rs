//! Peer records produced by completed handshakes, and the events reported to
//! the external peer manager.

use crate::protocol::handshake::HandshakeError;
use crate::protocol::message::HandshakePayload;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// An authenticated remote node. Created only by a successful handshake;
/// ownership passes to the peer manager, which updates `latest_block_number`
/// as the sync layer learns more and evicts the record when the connection
/// dies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Address derived from the peer's public key
    pub peer_id: String,

    /// Listening address the peer advertised
    pub ip: String,

    /// Listening port the peer advertised
    pub port: u16,

    /// Protocol version negotiated for this session
    pub network_version: u16,

    /// Client software identifier the peer reported
    pub client_id: String,

    /// Height of the peer's best chain at handshake time
    pub latest_block_number: u64,

    /// Epoch milliseconds at which the handshake completed locally
    pub established_at: u64,
}

impl Peer {
    /// Build the peer record from a fully validated handshake payload.
    pub fn from_payload(payload: &HandshakePayload, established_at: u64) -> Self {
        Self {
            peer_id: payload.peer_id.clone(),
            ip: payload.ip.clone(),
            port: payload.port,
            network_version: payload.network_version,
            client_id: payload.client_id.clone(),
            latest_block_number: payload.latest_block_number,
            established_at,
        }
    }
}

/// Outcome of one handshake attempt, delivered to the peer manager.
#[derive(Debug)]
pub enum HandshakeEvent {
    /// The connection was promoted to an authenticated peer
    Established(Peer),
    /// The connection was torn down; the error says why
    Rejected {
        /// Transport-level address the attempt came from
        addr: SocketAddr,
        error: HandshakeError,
    },
}
