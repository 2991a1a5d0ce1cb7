//! Handshake message types and the wire-level message sum type.
//!
//! `Hello` and `World` share a single payload shape; each side signs its own
//! payload with its own key, so validation logic is identical for both
//! directions. `Ping`/`Pong` are the application-level messages the codec
//! also carries once a peer is established.

use crate::protocol::codec;
use crate::protocol::identity::{self, NodeIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logically distinct blockchain instances. Nodes on different networks must
/// never peer with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    /// Wire representation of the network identifier.
    pub fn code(self) -> u8 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet => 1,
            Network::Devnet => 2,
        }
    }

    /// Inverse of [`Network::code`]; `None` for unassigned codes.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Network::Mainnet),
            1 => Some(Network::Testnet),
            2 => Some(Network::Devnet),
            _ => None,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(format!(
                "Invalid network: '{}'. Valid options: mainnet, testnet, devnet",
                s
            )),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        };
        write!(f, "{}", name)
    }
}

/// The payload shape shared by `Hello` and `World`.
///
/// A payload is valid iff its signature verifies against the embedded public
/// key over the canonical unsigned encoding, and `peer_id` equals the address
/// derived from that public key. A payload failing either check is simply
/// invalid; it never enters peer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    /// Network the sender claims to participate in
    pub network: Network,

    /// Protocol revision the sender speaks
    pub network_version: u16,

    /// Sender identity; must equal the address derived from `public_key`
    pub peer_id: String,

    /// Listening address the sender advertises (informational)
    pub ip: String,

    /// Listening port the sender advertises
    pub port: u16,

    /// Client software identifier (informational, bounded length)
    pub client_id: String,

    /// Height of the sender's best chain; consumed by the sync layer
    pub latest_block_number: u64,

    /// Sender's ed25519 public key
    pub public_key: Vec<u8>,

    /// Epoch milliseconds at signing time
    pub timestamp: u64,

    /// Detached signature over the canonical encoding of all other fields
    pub signature: Vec<u8>,
}

impl HandshakePayload {
    /// Assemble and sign a payload with the sender's own identity.
    ///
    /// `peer_id` and `public_key` are always derived from `identity`, so a
    /// payload built here satisfies the identity-binding invariant by
    /// construction.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        identity: &NodeIdentity,
        network: Network,
        network_version: u16,
        ip: String,
        port: u16,
        client_id: String,
        latest_block_number: u64,
        timestamp: u64,
    ) -> Self {
        let mut payload = Self {
            network,
            network_version,
            peer_id: identity.peer_id(),
            ip,
            port,
            client_id,
            latest_block_number,
            public_key: identity.public_key_bytes().to_vec(),
            timestamp,
            signature: Vec::new(),
        };
        payload.signature = identity.sign(&codec::unsigned_bytes(&payload)).to_vec();
        payload
    }

    /// Check the detached signature against the embedded public key.
    ///
    /// Malformed keys and signatures verify as `false`; this never panics.
    pub fn verify_signature(&self) -> bool {
        identity::verify(
            &self.public_key,
            &codec::unsigned_bytes(self),
            &self.signature,
        )
    }
}

/// Every message this layer can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Initiator's handshake message, sent immediately after connecting
    Hello(HandshakePayload),
    /// Responder's handshake reply, sent only after a Hello validated
    World(HandshakePayload),
    /// Liveness probe
    Ping,
    /// Liveness reply
    Pong,
}

impl Message {
    /// The message's name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::World(_) => "world",
            Message::Ping => "ping",
            Message::Pong => "pong",
        }
    }

    /// True for the two handshake variants. A handshake message arriving on
    /// an established session is a protocol violation.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Message::Hello(_) | Message::World(_))
    }
}
