use clap::Parser;
use p2p_node_handshake::{
    arguments_parser::{ApplicationMode, Args},
    protocol::{
        BanList, HandshakeClient, HandshakeError, HandshakeEvent, InMemoryBanList, Node,
        NodeIdentity,
    },
    telemetry::{log_operation_failure, log_operation_success, setup_telemetry, TelemetryConfig},
};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Argument validation error: {}", e);
        std::process::exit(1);
    }

    // Setup telemetry based on configuration
    let telemetry_config = TelemetryConfig::from_env();
    setup_telemetry(args.log_level.clone(), args.log_format.clone())
        .map_err(|e| anyhow::anyhow!("Failed to setup telemetry: {}", e))?;

    info!(
        service_name = %telemetry_config.service_name,
        service_version = %telemetry_config.service_version,
        environment = %telemetry_config.environment,
        bind_address = %args.bind_address,
        network = %args.network,
        mode = ?args.mode,
        "Starting P2P handshake application"
    );

    let start_time = Instant::now();

    // Load or generate this node's long-term identity. A corrupt or
    // unreadable key file is fatal; the node must not come up without it.
    let identity = match load_identity(&args) {
        Ok(identity) => Arc::new(identity),
        Err(e) => {
            error!(error = %e, "Failed to load node identity");
            std::process::exit(1);
        }
    };
    info!(peer_id = %identity.peer_id(), "Node identity ready");

    let result = match args.mode {
        ApplicationMode::Client => run_client_mode(&args, identity).await,
        ApplicationMode::Server => run_server_mode(&args, identity).await,
    };

    let duration = start_time.elapsed();

    match result {
        Ok(_) => {
            log_operation_success("application", duration);
            info!("Application completed successfully");
        }
        Err(e) => {
            log_operation_failure("application", e.as_ref(), duration);
            error!(error = %e, "Application failed");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Load the identity from the configured seed file, or generate a fresh one
fn load_identity(args: &Args) -> anyhow::Result<NodeIdentity> {
    match &args.key_file {
        Some(path) => {
            let identity = NodeIdentity::load(path)
                .map_err(|e| anyhow::anyhow!("key file {}: {}", path.display(), e))?;
            info!(key_file = %path.display(), "Loaded identity from key file");
            Ok(identity)
        }
        None => {
            info!("No key file configured, generating an ephemeral identity");
            Ok(NodeIdentity::generate())
        }
    }
}

/// Run the application in client mode - perform handshakes with peers
async fn run_client_mode(args: &Args, identity: Arc<NodeIdentity>) -> anyhow::Result<()> {
    info!(
        peer_count = args.peer_addresses.len(),
        continuous = args.continuous,
        "Running in client mode"
    );

    let client = HandshakeClient::with_config(
        identity,
        Arc::new(args.protocol_config()),
        Arc::new(InMemoryBanList::new()),
        args.max_retries,
    );

    if args.continuous {
        run_continuous_client_mode(&client, args).await
    } else {
        run_single_client_mode(&client, args).await
    }
}

/// Run client in single-shot mode
async fn run_single_client_mode(client: &HandshakeClient, args: &Args) -> anyhow::Result<()> {
    info!("Performing single batch of handshakes");

    // Resolve hostnames to SocketAddrs
    let peer_addresses = resolve_peer_addresses(&args.peer_addresses)?;

    let start_time = Instant::now();
    let results = client.perform_batch_handshakes(peer_addresses).await;
    let duration = start_time.elapsed();

    let successful_count = results.iter().filter(|(_, result)| result.is_ok()).count();

    info!(
        total_peers = results.len(),
        successful_handshakes = successful_count,
        duration_ms = duration.as_millis(),
        "Batch handshakes completed"
    );

    // Log individual results
    for (peer_addr, result) in results {
        match result {
            Ok(peer) => {
                info!(
                    peer_addr = %peer_addr,
                    peer_id = %peer.peer_id,
                    network_version = peer.network_version,
                    client_id = %peer.client_id,
                    latest_block_number = peer.latest_block_number,
                    "Handshake successful"
                );
            }
            Err(e) => {
                warn!(
                    peer_addr = %peer_addr,
                    error = %e,
                    "Handshake failed"
                );
            }
        }
    }

    Ok(())
}

/// Run client in continuous mode
async fn run_continuous_client_mode(client: &HandshakeClient, args: &Args) -> anyhow::Result<()> {
    info!(
        interval_secs = args.interval_secs,
        "Running in continuous client mode"
    );

    // Resolve hostnames to SocketAddrs once
    let peer_addresses = resolve_peer_addresses(&args.peer_addresses)?;

    let mut interval = tokio::time::interval(args.continuous_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        info!("Starting continuous handshake cycle");
        let start_time = Instant::now();

        let results = client
            .perform_batch_handshakes(peer_addresses.clone())
            .await;
        let duration = start_time.elapsed();

        let successful_count = results.iter().filter(|(_, result)| result.is_ok()).count();

        info!(
            total_peers = results.len(),
            successful_handshakes = successful_count,
            duration_ms = duration.as_millis(),
            "Continuous handshake cycle completed"
        );
    }
}

/// Run the application in server mode - listen for incoming handshakes
async fn run_server_mode(args: &Args, identity: Arc<NodeIdentity>) -> anyhow::Result<()> {
    info!("Running in server mode - listening for handshakes");

    let banlist = Arc::new(InMemoryBanList::new());
    let (node, events) = Node::bind(
        &args.bind_address,
        identity,
        Arc::new(args.protocol_config()),
        banlist.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to bind node: {}", e))?;

    info!(local_addr = %node.local_addr(), "Node listening for handshakes");

    // Drain handshake outcomes as a minimal peer manager: log them and feed
    // active rejections back into the banlist as offenses.
    tokio::spawn(drain_handshake_events(events, banlist));

    node.run()
        .await
        .map_err(|e| anyhow::anyhow!("Node error: {}", e))?;

    Ok(())
}

/// Consume handshake outcome events from the node
async fn drain_handshake_events(
    mut events: tokio::sync::mpsc::UnboundedReceiver<HandshakeEvent>,
    banlist: Arc<InMemoryBanList>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HandshakeEvent::Established(peer) => {
                info!(
                    peer_id = %peer.peer_id,
                    network_version = peer.network_version,
                    client_id = %peer.client_id,
                    latest_block_number = peer.latest_block_number,
                    "Peer established"
                );
            }
            HandshakeEvent::Rejected { addr, error } => {
                warn!(addr = %addr, error = %error, "Handshake rejected");

                // An actively invalid payload counts as an offense; decode
                // failures and timeouts do not, they are usually just noise.
                if let HandshakeError::Rejected {
                    claimed_peer_id, ..
                } = &error
                {
                    banlist
                        .record_offense(claimed_peer_id, &addr.ip().to_string())
                        .await;
                }
            }
        }
    }
}

/// Resolve hostname:port strings to SocketAddr
fn resolve_peer_addresses(peer_addresses: &[String]) -> anyhow::Result<Vec<SocketAddr>> {
    let mut resolved_addrs = Vec::new();

    for addr_str in peer_addresses {
        // Try to resolve hostname to SocketAddr
        match addr_str.to_socket_addrs() {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    resolved_addrs.push(addr);
                } else {
                    return Err(anyhow::anyhow!("Could not resolve address: {}", addr_str));
                }
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to resolve address '{}': {}",
                    addr_str,
                    e
                ));
            }
        }
    }

    Ok(resolved_addrs)
}
