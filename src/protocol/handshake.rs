//! Per-connection handshake driver.
//!
//! Both roles complete in exactly one round trip: the initiator sends a
//! signed `Hello` and waits for a `World`; the responder waits for a
//! `Hello`, validates it, and answers with its own signed `World`. Either
//! side rejecting simply closes the connection; nothing about the reason
//! ever goes over the wire.
//!
//! The drivers are generic over any byte-oriented duplex stream, so the
//! state machine runs identically over TCP and over in-memory test pipes.

use crate::protocol::banlist::BanList;
use crate::protocol::codec::{self, DecodeError, FRAME_HEADER_WIDTH};
use crate::protocol::config::ProtocolConfig;
use crate::protocol::identity::NodeIdentity;
use crate::protocol::message::{HandshakePayload, Message};
use crate::protocol::peer::Peer;
use crate::protocol::validation::{self, Clock, RejectReason, SystemClock};
use byteorder::{BigEndian, ByteOrder};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info};

/// Everything that can go wrong on one connection's handshake. All of these
/// are contained to that connection; none are fatal to the node.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("i/o error during handshake: {0}")]
    Io(#[from] io::Error),

    #[error("malformed wire message: {0}")]
    Decode(#[from] DecodeError),

    #[error("handshake rejected: {reason}")]
    Rejected {
        reason: RejectReason,
        /// Identity the remote claimed in its payload; stays local for
        /// logging and ban tracking, never goes back over the wire.
        claimed_peer_id: String,
    },

    #[error("unexpected {got} message during handshake")]
    UnexpectedMessage { got: &'static str },

    #[error("handshake deadline exceeded")]
    Timeout,

    #[error("connection closed before the handshake completed")]
    ConnectionClosed,

    #[error("handshake failed after {attempts} attempts")]
    RetriesExhausted { attempts: u8 },
}

impl HandshakeError {
    /// True when retrying on a fresh connection cannot help: the peer
    /// actively rejected us or spoke the protocol wrong.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            HandshakeError::Rejected { .. }
                | HandshakeError::Decode(_)
                | HandshakeError::UnexpectedMessage { .. }
        )
    }
}

/// Progress of a single connection's handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Responder: waiting for the initiator's Hello
    AwaitingHello,
    /// Initiator: Hello sent, waiting for the responder's World
    AwaitingWorld,
    /// Inbound payload received, validation pipeline running
    Validating,
    /// Handshake complete, connection promoted to a peer
    Established,
    /// Handshake failed, connection torn down
    Rejected,
}

/// Write one length-prefixed frame to the stream.
pub async fn write_frame<S>(stream: &mut S, message: &Message) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let body = codec::encode(message);
    let mut frame = Vec::with_capacity(FRAME_HEADER_WIDTH + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    stream.write_all(&frame).await?;
    stream.flush().await
}

/// Read one length-prefixed frame and decode it.
///
/// The declared body length is checked against `max_message_size` before the
/// body buffer is allocated, so a hostile frame header cannot force a large
/// allocation.
pub async fn read_frame<S>(stream: &mut S, max_message_size: usize) -> Result<Message, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_WIDTH];
    read_exact_or_closed(stream, &mut header).await?;

    let declared = BigEndian::read_u32(&header) as usize;
    if declared > max_message_size {
        return Err(HandshakeError::Decode(DecodeError::Oversized {
            len: declared,
            max: max_message_size,
        }));
    }

    let mut body = vec![0u8; declared];
    read_exact_or_closed(stream, &mut body).await?;

    Ok(codec::decode(&body, max_message_size)?)
}

async fn read_exact_or_closed<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(HandshakeError::ConnectionClosed),
        Err(e) => Err(HandshakeError::Io(e)),
    }
}

/// Drives handshakes for both roles. One instance per node, shared by every
/// connection; all state here is read-only after startup except the chain
/// height, which the sync layer bumps as blocks arrive.
pub struct Handshaker {
    identity: Arc<NodeIdentity>,
    config: Arc<ProtocolConfig>,
    banlist: Arc<dyn BanList>,
    clock: Arc<dyn Clock>,
    local_peer_id: String,
    latest_block_number: AtomicU64,
}

impl Handshaker {
    pub fn new(
        identity: Arc<NodeIdentity>,
        config: Arc<ProtocolConfig>,
        banlist: Arc<dyn BanList>,
    ) -> Self {
        Self::with_clock(identity, config, banlist, Arc::new(SystemClock))
    }

    /// Construct with an explicit clock, for deterministic freshness tests.
    pub fn with_clock(
        identity: Arc<NodeIdentity>,
        config: Arc<ProtocolConfig>,
        banlist: Arc<dyn BanList>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let local_peer_id = identity.peer_id();
        Self {
            identity,
            config,
            banlist,
            clock,
            local_peer_id,
            latest_block_number: AtomicU64::new(0),
        }
    }

    /// This node's own network-visible identity.
    pub fn local_peer_id(&self) -> &str {
        &self.local_peer_id
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Chain height advertised in outgoing payloads; updated by the sync
    /// layer as the local chain grows.
    pub fn set_latest_block_number(&self, height: u64) {
        self.latest_block_number.store(height, Ordering::Relaxed);
    }

    fn own_payload(&self, local: SocketAddr) -> HandshakePayload {
        HandshakePayload::build(
            &self.identity,
            self.config.network,
            self.config.max_network_version,
            local.ip().to_string(),
            local.port(),
            self.config.client_id.clone(),
            self.latest_block_number.load(Ordering::Relaxed),
            self.clock.now_millis(),
        )
    }

    /// Responder side: await a Hello, validate it, answer with our World.
    ///
    /// On any failure nothing is written back; the caller closes the
    /// connection and the remote learns only that it was dropped.
    pub async fn respond<S>(
        &self,
        stream: &mut S,
        local: SocketAddr,
        remote: SocketAddr,
    ) -> Result<Peer, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut state = HandshakeState::AwaitingHello;
        debug!(?state, %remote, "inbound handshake started");

        let message = timeout(
            self.config.handshake_timeout,
            read_frame(stream, self.config.max_message_size),
        )
        .await
        .map_err(|_| HandshakeError::Timeout)??;

        let payload = match message {
            Message::Hello(payload) => payload,
            other => {
                return Err(HandshakeError::UnexpectedMessage { got: other.name() });
            }
        };

        state = HandshakeState::Validating;
        debug!(?state, %remote, peer_id = %payload.peer_id, "validating hello");

        if let Err(reason) = self.validate(&payload).await {
            state = HandshakeState::Rejected;
            debug!(?state, %remote, reason = %reason, "hello rejected");
            return Err(HandshakeError::Rejected {
                reason,
                claimed_peer_id: payload.peer_id,
            });
        }

        write_frame(stream, &Message::World(self.own_payload(local))).await?;

        state = HandshakeState::Established;
        info!(
            ?state,
            %remote,
            peer_id = %payload.peer_id,
            network_version = payload.network_version,
            latest_block_number = payload.latest_block_number,
            "peer established"
        );

        Ok(Peer::from_payload(&payload, self.clock.now_millis()))
    }

    /// Initiator side: send our Hello, await the World, validate it.
    ///
    /// The trust requirements are symmetric: the World goes through exactly
    /// the same pipeline a responder applies to a Hello.
    pub async fn initiate<S>(
        &self,
        stream: &mut S,
        local: SocketAddr,
        remote: SocketAddr,
    ) -> Result<Peer, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        write_frame(stream, &Message::Hello(self.own_payload(local))).await?;

        let mut state = HandshakeState::AwaitingWorld;
        debug!(?state, %remote, "hello sent");

        let message = timeout(
            self.config.handshake_timeout,
            read_frame(stream, self.config.max_message_size),
        )
        .await
        .map_err(|_| HandshakeError::Timeout)??;

        let payload = match message {
            Message::World(payload) => payload,
            other => {
                return Err(HandshakeError::UnexpectedMessage { got: other.name() });
            }
        };

        state = HandshakeState::Validating;
        debug!(?state, %remote, peer_id = %payload.peer_id, "validating world");

        if let Err(reason) = self.validate(&payload).await {
            state = HandshakeState::Rejected;
            debug!(?state, %remote, reason = %reason, "world rejected");
            return Err(HandshakeError::Rejected {
                reason,
                claimed_peer_id: payload.peer_id,
            });
        }

        state = HandshakeState::Established;
        info!(
            ?state,
            %remote,
            peer_id = %payload.peer_id,
            network_version = payload.network_version,
            latest_block_number = payload.latest_block_number,
            "peer established"
        );

        Ok(Peer::from_payload(&payload, self.clock.now_millis()))
    }

    async fn validate(&self, payload: &HandshakePayload) -> Result<(), RejectReason> {
        validation::validate_payload(
            payload,
            &self.config,
            &self.local_peer_id,
            self.banlist.as_ref(),
            self.clock.as_ref(),
        )
        .await
    }
}
