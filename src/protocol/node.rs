//! Responder node: accepts transport connections, runs the handshake on each
//! one, and reports outcomes to the peer manager.

use crate::protocol::banlist::BanList;
use crate::protocol::config::ProtocolConfig;
use crate::protocol::handshake::{self, HandshakeError, Handshaker};
use crate::protocol::identity::NodeIdentity;
use crate::protocol::message::Message;
use crate::protocol::peer::{HandshakeEvent, Peer};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

type PeerRegistry = Arc<RwLock<HashMap<String, Peer>>>;

/// A listening node. Every inbound connection gets its own task that runs
/// the responder handshake and, on success, a post-establishment session
/// loop. Outcomes are delivered as [`HandshakeEvent`]s on the channel handed
/// out by [`Node::bind`]; per-connection failures never affect other
/// connections or the accept loop.
pub struct Node {
    listener: TcpListener,
    local_addr: SocketAddr,
    handshaker: Arc<Handshaker>,
    peers: PeerRegistry,
    events: mpsc::UnboundedSender<HandshakeEvent>,
}

impl Node {
    /// Bind the listener and prepare the handshake driver.
    ///
    /// Returns the node together with the receiving end of its outcome
    /// channel; the caller (the peer manager) owns peer lifecycle from there.
    pub async fn bind(
        bind_addr: &str,
        identity: Arc<NodeIdentity>,
        config: Arc<ProtocolConfig>,
        banlist: Arc<dyn BanList>,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<HandshakeEvent>)> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let handshaker = Arc::new(Handshaker::new(identity, config, banlist));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            %local_addr,
            peer_id = %handshaker.local_peer_id(),
            network = %handshaker.config().network,
            "node listening"
        );

        let node = Self {
            listener,
            local_addr,
            handshaker,
            peers: Arc::new(RwLock::new(HashMap::new())),
            events: events_tx,
        };
        Ok((node, events_rx))
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The handshake driver, exposed so the sync layer can keep the
    /// advertised chain height current.
    pub fn handshaker(&self) -> &Arc<Handshaker> {
        &self.handshaker
    }

    /// Snapshot of all currently established peers.
    pub async fn peers(&self) -> Vec<Peer> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Look up one established peer by id.
    pub async fn peer(&self, peer_id: &str) -> Option<Peer> {
        self.peers.read().await.get(peer_id).cloned()
    }

    /// Accept loop. Runs until the task is dropped or aborted.
    pub async fn run(&self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(%remote, "accepted connection");
                    let handshaker = self.handshaker.clone();
                    let peers = self.peers.clone();
                    let events = self.events.clone();
                    let local_addr = self.local_addr;
                    tokio::spawn(async move {
                        handle_connection(stream, local_addr, remote, handshaker, peers, events)
                            .await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// One connection's full lifetime: handshake, then the session loop.
async fn handle_connection(
    mut stream: TcpStream,
    local_addr: SocketAddr,
    remote: SocketAddr,
    handshaker: Arc<Handshaker>,
    peers: PeerRegistry,
    events: mpsc::UnboundedSender<HandshakeEvent>,
) {
    match handshaker.respond(&mut stream, local_addr, remote).await {
        Ok(peer) => {
            let peer_id = peer.peer_id.clone();
            peers.write().await.insert(peer_id.clone(), peer.clone());
            let _ = events.send(HandshakeEvent::Established(peer));

            if let Err(e) = session_loop(&mut stream, remote, &handshaker).await {
                warn!(%remote, peer_id = %peer_id, error = %e, "session ended with error");
            }

            peers.write().await.remove(&peer_id);
            debug!(%remote, peer_id = %peer_id, "peer disconnected");
        }
        Err(error) => {
            // Silent rejection: nothing is written back, the connection is
            // simply dropped. The reason stays local, in logs and events.
            warn!(%remote, error = %error, "handshake failed");
            let _ = events.send(HandshakeEvent::Rejected {
                addr: remote,
                error,
            });
        }
    }
}

/// Serve an established session. A peer must not re-handshake mid-session:
/// any further handshake-kind message disconnects it immediately.
async fn session_loop(
    stream: &mut TcpStream,
    remote: SocketAddr,
    handshaker: &Handshaker,
) -> Result<(), HandshakeError> {
    let max = handshaker.config().max_message_size;
    loop {
        match handshake::read_frame(stream, max).await {
            Ok(Message::Ping) => {
                handshake::write_frame(stream, &Message::Pong).await?;
            }
            Ok(Message::Pong) => {
                debug!(%remote, "pong received");
            }
            Ok(message @ (Message::Hello(_) | Message::World(_))) => {
                warn!(%remote, kind = message.name(), "handshake message on established session");
                return Err(HandshakeError::UnexpectedMessage {
                    got: message.name(),
                });
            }
            Err(HandshakeError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}
