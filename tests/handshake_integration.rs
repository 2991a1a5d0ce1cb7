use p2p_node_handshake::protocol::{
    handshake, Clock, DecodeError, HandshakeClient, HandshakeError, HandshakeEvent, Handshaker,
    HandshakePayload, InMemoryBanList, Message, Network, NoBanList, Node, NodeIdentity,
    ProtocolConfig, RejectReason, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Helper to spawn a listening node on an ephemeral loopback port
async fn spawn_test_node(
    config: ProtocolConfig,
    banlist: Arc<InMemoryBanList>,
) -> (
    Arc<Node>,
    UnboundedReceiver<HandshakeEvent>,
    JoinHandle<()>,
) {
    let identity = Arc::new(NodeIdentity::generate());
    let (node, events) = Node::bind("127.0.0.1:0", identity, Arc::new(config), banlist)
        .await
        .unwrap();

    let node = Arc::new(node);
    let run_node = node.clone();
    let handle = tokio::spawn(async move {
        // Run for a bounded time so an aborted test cannot leak the task
        tokio::select! {
            _ = run_node.run() => {},
            _ = sleep(Duration::from_secs(10)) => {}
        }
    });

    (node, events, handle)
}

/// Helper to create a handshake client with the given identity and config
fn test_client(identity: NodeIdentity, config: ProtocolConfig, max_retries: u8) -> HandshakeClient {
    HandshakeClient::with_config(
        Arc::new(identity),
        Arc::new(config),
        Arc::new(InMemoryBanList::new()),
        max_retries,
    )
}

/// Wait for the next handshake outcome event, failing the test on silence
async fn next_event(events: &mut UnboundedReceiver<HandshakeEvent>) -> HandshakeEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a handshake event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_successful_handshake() {
    let (node, mut events, server_handle) =
        spawn_test_node(ProtocolConfig::default(), Arc::new(InMemoryBanList::new())).await;
    node.handshaker().set_latest_block_number(1_337);

    let client_identity = NodeIdentity::generate();
    let client_peer_id = client_identity.peer_id();
    let client = test_client(client_identity, ProtocolConfig::default(), 2);
    client.set_latest_block_number(42);

    let result = client.perform_handshake(node.local_addr()).await;
    let peer = tokio_test::assert_ok!(result, "handshake should succeed");

    // The client's Peer record describes the responder
    assert_eq!(peer.peer_id, node.handshaker().local_peer_id());
    assert_eq!(peer.latest_block_number, 1_337);
    assert_eq!(peer.network_version, 1);

    // The server's event describes the initiator
    match next_event(&mut events).await {
        HandshakeEvent::Established(peer) => {
            assert_eq!(peer.peer_id, client_peer_id);
            assert_eq!(peer.latest_block_number, 42);
        }
        other => panic!("Expected Established event, got: {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_handshake_network_mismatch() {
    // Server on testnet, client on mainnet
    let (node, mut events, server_handle) = spawn_test_node(
        ProtocolConfig {
            network: Network::Testnet,
            ..ProtocolConfig::default()
        },
        Arc::new(InMemoryBanList::new()),
    )
    .await;

    let client_identity = NodeIdentity::generate();
    let client_peer_id = client_identity.peer_id();
    let client = test_client(
        client_identity,
        ProtocolConfig {
            network: Network::Mainnet,
            handshake_timeout: Duration::from_millis(500),
            ..ProtocolConfig::default()
        },
        1,
    );

    let result = client.perform_handshake(node.local_addr()).await;

    // No World is sent; the initiator only sees the connection die
    assert!(
        matches!(
            result,
            Err(HandshakeError::ConnectionClosed) | Err(HandshakeError::Timeout)
        ),
        "client should see a silent close, got: {:?}",
        result
    );

    // The reason stays local to the responder, together with the claimed id
    match next_event(&mut events).await {
        HandshakeEvent::Rejected {
            error:
                HandshakeError::Rejected {
                    reason: RejectReason::NetworkMismatch,
                    claimed_peer_id,
                },
            ..
        } => {
            assert_eq!(claimed_peer_id, client_peer_id);
        }
        other => panic!("Expected NetworkMismatch rejection, got: {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_responder_timeout_on_silent_connection() {
    let (node, mut events, server_handle) = spawn_test_node(
        ProtocolConfig {
            handshake_timeout: Duration::from_millis(200),
            ..ProtocolConfig::default()
        },
        Arc::new(InMemoryBanList::new()),
    )
    .await;

    // Connect and never send a Hello
    let _stream = TcpStream::connect(node.local_addr()).await.unwrap();

    match next_event(&mut events).await {
        HandshakeEvent::Rejected {
            error: HandshakeError::Timeout,
            ..
        } => {}
        other => panic!("Expected Timeout rejection, got: {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_initiator_timeout_against_silent_listener() {
    // A listener that accepts connections and never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let listener_handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = test_client(
        NodeIdentity::generate(),
        ProtocolConfig {
            handshake_timeout: Duration::from_millis(200),
            ..ProtocolConfig::default()
        },
        1,
    );

    let result = client.perform_handshake(addr).await;
    assert!(matches!(result, Err(HandshakeError::Timeout)));

    listener_handle.abort();
}

#[tokio::test]
async fn test_retries_with_backoff_take_time() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let listener_handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = test_client(
        NodeIdentity::generate(),
        ProtocolConfig {
            handshake_timeout: Duration::from_millis(200),
            ..ProtocolConfig::default()
        },
        3,
    );

    let start_time = std::time::Instant::now();
    let result = client.perform_handshake(addr).await;
    let duration = start_time.elapsed();

    // Should fail after all retries
    assert!(result.is_err());

    // 3 attempts with exponential backoff between them: 1s + 2s of waiting
    assert!(
        duration >= Duration::from_secs(2),
        "Should take time for retries, took {:?}",
        duration
    );

    listener_handle.abort();
}

#[tokio::test]
async fn test_oversized_frame_rejected() {
    let (node, mut events, server_handle) =
        spawn_test_node(ProtocolConfig::default(), Arc::new(InMemoryBanList::new())).await;

    // Declare a body far beyond the ceiling; the responder must reject on
    // the header alone, before buffering any body
    let mut stream = TcpStream::connect(node.local_addr()).await.unwrap();
    stream.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

    match next_event(&mut events).await {
        HandshakeEvent::Rejected {
            error: HandshakeError::Decode(DecodeError::Oversized { .. }),
            ..
        } => {}
        other => panic!("Expected Oversized rejection, got: {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_banned_peer_rejected() {
    let banlist = Arc::new(InMemoryBanList::new());
    let (node, mut events, server_handle) =
        spawn_test_node(ProtocolConfig::default(), banlist.clone()).await;

    let client_identity = NodeIdentity::generate();
    banlist.ban(&client_identity.peer_id()).await;

    let client = test_client(
        client_identity,
        ProtocolConfig {
            handshake_timeout: Duration::from_millis(500),
            ..ProtocolConfig::default()
        },
        1,
    );

    let result = client.perform_handshake(node.local_addr()).await;
    assert!(result.is_err(), "banned peer must not establish");

    match next_event(&mut events).await {
        HandshakeEvent::Rejected {
            error:
                HandshakeError::Rejected {
                    reason: RejectReason::PeerBanned,
                    ..
                },
            ..
        } => {}
        other => panic!("Expected PeerBanned rejection, got: {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_version_gating() {
    // Server accepts versions [2, 4]
    let server_config = ProtocolConfig {
        min_network_version: 2,
        max_network_version: 4,
        ..ProtocolConfig::default()
    };

    let (node, mut events, server_handle) =
        spawn_test_node(server_config.clone(), Arc::new(InMemoryBanList::new())).await;

    // A client advertising version 4 is inside the range
    let compatible = test_client(NodeIdentity::generate(), server_config, 1);
    let result = compatible.perform_handshake(node.local_addr()).await;
    assert!(result.is_ok(), "version 4 should be accepted: {:?}", result);
    assert!(matches!(
        next_event(&mut events).await,
        HandshakeEvent::Established(_)
    ));

    // A client advertising version 5 is outside it
    let too_new = test_client(
        NodeIdentity::generate(),
        ProtocolConfig {
            min_network_version: 2,
            max_network_version: 5,
            handshake_timeout: Duration::from_millis(500),
            ..ProtocolConfig::default()
        },
        1,
    );
    let result = too_new.perform_handshake(node.local_addr()).await;
    assert!(result.is_err(), "version 5 should be rejected");

    match next_event(&mut events).await {
        HandshakeEvent::Rejected {
            error:
                HandshakeError::Rejected {
                    reason: RejectReason::VersionUnsupported,
                    ..
                },
            ..
        } => {}
        other => panic!("Expected VersionUnsupported rejection, got: {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ping_pong_after_establishment() {
    let (node, _events, server_handle) =
        spawn_test_node(ProtocolConfig::default(), Arc::new(InMemoryBanList::new())).await;

    // Drive the initiator side by hand to keep the session stream
    let handshaker = Handshaker::new(
        Arc::new(NodeIdentity::generate()),
        Arc::new(ProtocolConfig::default()),
        Arc::new(NoBanList),
    );
    let mut stream = TcpStream::connect(node.local_addr()).await.unwrap();
    let local = stream.local_addr().unwrap();
    handshaker
        .initiate(&mut stream, local, node.local_addr())
        .await
        .unwrap();

    let max = handshaker.config().max_message_size;
    handshake::write_frame(&mut stream, &Message::Ping)
        .await
        .unwrap();
    let reply = handshake::read_frame(&mut stream, max).await.unwrap();
    assert_eq!(reply, Message::Pong);

    server_handle.abort();
}

#[tokio::test]
async fn test_rehandshake_after_establishment_disconnects() {
    let (node, _events, server_handle) =
        spawn_test_node(ProtocolConfig::default(), Arc::new(InMemoryBanList::new())).await;

    let identity = Arc::new(NodeIdentity::generate());
    let peer_id = identity.peer_id();
    let handshaker = Handshaker::new(
        identity.clone(),
        Arc::new(ProtocolConfig::default()),
        Arc::new(NoBanList),
    );
    let mut stream = TcpStream::connect(node.local_addr()).await.unwrap();
    let local = stream.local_addr().unwrap();
    handshaker
        .initiate(&mut stream, local, node.local_addr())
        .await
        .unwrap();

    // The responder registers the peer right after sending its World
    sleep(Duration::from_millis(100)).await;
    assert!(node.peer(&peer_id).await.is_some());

    // A second Hello on the established session is a protocol violation;
    // the responder drops the connection without answering
    let config = ProtocolConfig::default();
    let rehello = HandshakePayload::build(
        &identity,
        config.network,
        config.max_network_version,
        local.ip().to_string(),
        local.port(),
        config.client_id.clone(),
        0,
        SystemClock.now_millis(),
    );
    handshake::write_frame(&mut stream, &Message::Hello(rehello))
        .await
        .unwrap();

    let result = handshake::read_frame(&mut stream, config.max_message_size).await;
    assert!(
        matches!(
            result,
            Err(HandshakeError::ConnectionClosed) | Err(HandshakeError::Io(_))
        ),
        "session should be torn down, got: {:?}",
        result
    );

    // The registry forgets the peer once its connection dies
    sleep(Duration::from_millis(100)).await;
    assert!(node.peer(&peer_id).await.is_none());

    server_handle.abort();
}
