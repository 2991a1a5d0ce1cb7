//! # P2P Node Handshake
//!
//! The peer-to-peer admission-control layer of a blockchain full node.
//! This library implements the signed Hello/World handshake two nodes run
//! after connecting: wire framing, payload signing and verification,
//! network/version/freshness validation, and the promotion of a raw
//! connection to an authenticated peer.

/// CLI argument parsing and configuration management
pub mod arguments_parser;

/// Structured logging and telemetry infrastructure
pub mod telemetry;

/// The handshake protocol core
pub mod protocol {
    /// Banlist query surface consumed during validation
    pub mod banlist;

    /// Initiator client for establishing outbound peers
    pub mod client;

    /// Fixed-layout binary wire codec
    pub mod codec;

    /// Protocol configuration values
    pub mod config;

    /// Per-connection handshake state machine and framed stream I/O
    pub mod handshake;

    /// Node identity: key pair, signing, address derivation
    pub mod identity;

    /// Handshake message types and the wire message sum type
    pub mod message;

    /// Responder node: listener, per-connection tasks, peer registry
    pub mod node;

    /// Peer records and handshake outcome events
    pub mod peer;

    /// Compatibility and freshness validation pipeline
    pub mod validation;

    pub use banlist::{BanList, InMemoryBanList, NoBanList};
    pub use client::HandshakeClient;
    pub use codec::DecodeError;
    pub use config::ProtocolConfig;
    pub use handshake::{HandshakeError, HandshakeState, Handshaker};
    pub use identity::{KeyError, NodeIdentity};
    pub use message::{HandshakePayload, Message, Network};
    pub use node::Node;
    pub use peer::{HandshakeEvent, Peer};
    pub use validation::{Clock, RejectReason, SystemClock};
}

// Re-export commonly used types for easier access
pub use arguments_parser::Args;
pub use protocol::{HandshakeClient, Node, NodeIdentity, Peer, ProtocolConfig};
pub use telemetry::setup_telemetry;
