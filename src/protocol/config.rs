//! Protocol configuration values consumed by the handshake layer.

use crate::protocol::message::Network;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline for a complete handshake exchange (5 seconds)
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Default tolerated clock skew for handshake timestamps (2 minutes)
pub const DEFAULT_TIMESTAMP_TOLERANCE_MS: u64 = 120_000;

/// Default ceiling on a single wire message (8 KiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Default client identifier advertised in handshake payloads
pub const DEFAULT_CLIENT_ID: &str = concat!("p2p_node_handshake/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every handshake attempt of a node.
///
/// Built once at startup (usually from CLI arguments) and injected into the
/// handshake driver; nothing here changes for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Network this node participates in; peers on other networks are rejected
    pub network: Network,

    /// Lowest peer network version this node accepts (inclusive)
    pub min_network_version: u16,

    /// Highest peer network version this node accepts (inclusive); also the
    /// version advertised in this node's own payloads
    pub max_network_version: u16,

    /// Deadline for the counterpart's handshake message to arrive
    pub handshake_timeout: Duration,

    /// Maximum accepted distance between a payload timestamp and the local clock
    pub timestamp_tolerance_ms: u64,

    /// Ceiling on a single wire message, enforced before the body is buffered
    pub max_message_size: usize,

    /// Client identifier carried in this node's own payloads
    pub client_id: String,
}

impl ProtocolConfig {
    /// True when `version` falls inside the accepted inclusive range.
    pub fn supports_version(&self, version: u16) -> bool {
        version >= self.min_network_version && version <= self.max_network_version
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            min_network_version: 1,
            max_network_version: 1,
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            timestamp_tolerance_ms: DEFAULT_TIMESTAMP_TOLERANCE_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}
