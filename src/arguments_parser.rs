//! Command-line argument parsing and configuration management
//!
//! This module provides CLI argument parsing using clap for configuring
//! the handshake client and the listening node.

use crate::protocol::config::ProtocolConfig;
use crate::protocol::message::Network;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Command-line arguments for the P2P handshake application
#[derive(Parser, Debug, Clone)]
#[command(
    name = "p2p_node_handshake",
    version = "0.1.0",
    about = "P2P node handshake client and listener",
    long_about = "A node that performs the signed Hello/World handshake protocol with remote peers, either initiating handshakes (client mode) or accepting them (server mode)."
)]
pub struct Args {
    /// Local address to bind the listening node (e.g., "0.0.0.0:5160")
    #[arg(
        short = 'b',
        long = "bind",
        default_value = "0.0.0.0:0",
        help = "Local address to bind for TCP communication"
    )]
    pub bind_address: String,

    /// Network this node participates in
    #[arg(
        short = 'n',
        long = "network",
        default_value = "mainnet",
        help = "Network identifier (mainnet, testnet, devnet)"
    )]
    pub network: Network,

    /// Remote peer addresses to connect to (can be specified multiple times)
    #[arg(
        short = 'p',
        long = "peers",
        help = "Remote peer addresses to perform handshakes with (e.g., 127.0.0.1:5160 or seed-node:5160)"
    )]
    pub peer_addresses: Vec<String>,

    /// Lowest peer network version accepted (inclusive)
    #[arg(
        long = "min-version",
        default_value = "1",
        help = "Lowest peer network version accepted (inclusive)"
    )]
    pub min_network_version: u16,

    /// Highest peer network version accepted (inclusive); also advertised
    #[arg(
        long = "max-version",
        default_value = "1",
        help = "Highest peer network version accepted (inclusive); advertised in our own payloads"
    )]
    pub max_network_version: u16,

    /// Handshake deadline in milliseconds
    #[arg(
        short = 't',
        long = "timeout-ms",
        default_value = "5000",
        help = "Deadline for the counterpart's handshake message in milliseconds"
    )]
    pub handshake_timeout_ms: u64,

    /// Tolerated clock skew for handshake timestamps in milliseconds
    #[arg(
        long = "tolerance-ms",
        default_value = "120000",
        help = "Maximum accepted distance between a payload timestamp and the local clock in milliseconds"
    )]
    pub timestamp_tolerance_ms: u64,

    /// Ceiling on a single wire message in bytes
    #[arg(
        long = "max-message-size",
        default_value = "8192",
        help = "Maximum size of a single wire message in bytes"
    )]
    pub max_message_size: usize,

    /// Maximum retry attempts for failed handshakes
    #[arg(
        short = 'r',
        long = "max-retries",
        default_value = "3",
        help = "Maximum number of attempts for failed handshakes"
    )]
    pub max_retries: u8,

    /// Seed file holding this node's identity key
    #[arg(
        short = 'k',
        long = "key-file",
        help = "Path to a hex-encoded ed25519 seed file; a fresh identity is generated when omitted"
    )]
    pub key_file: Option<PathBuf>,

    /// Client identifier advertised in handshake payloads
    #[arg(
        long = "client-id",
        help = "Client software identifier carried in our own payloads"
    )]
    pub client_id: Option<String>,

    /// Application mode
    #[arg(
        short = 'm',
        long = "mode",
        default_value = "client",
        help = "Application mode: client (perform handshakes) or server (listen for handshakes)"
    )]
    pub mode: ApplicationMode,

    /// Log level for application output
    #[arg(
        short = 'l',
        long = "log-level",
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: LogLevel,

    /// Output log format
    #[arg(
        long = "log-format",
        default_value = "pretty",
        help = "Log output format (pretty, json)"
    )]
    pub log_format: LogFormat,

    /// Run in continuous mode (keep the application running)
    #[arg(
        short = 'c',
        long = "continuous",
        help = "Run in continuous mode, keeping the application running"
    )]
    pub continuous: bool,

    /// Interval between handshake attempts in continuous mode (seconds)
    #[arg(
        short = 'i',
        long = "interval",
        default_value = "60",
        help = "Interval between handshake attempts in continuous mode (seconds)"
    )]
    pub interval_secs: u16,
}

impl Args {
    /// Get the continuous mode interval as a Duration
    pub fn continuous_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.into())
    }

    /// Collect the protocol-level settings into the injected config struct
    pub fn protocol_config(&self) -> ProtocolConfig {
        let defaults = ProtocolConfig::default();
        ProtocolConfig {
            network: self.network,
            min_network_version: self.min_network_version,
            max_network_version: self.max_network_version,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            timestamp_tolerance_ms: self.timestamp_tolerance_ms,
            max_message_size: self.max_message_size,
            client_id: self.client_id.clone().unwrap_or(defaults.client_id),
        }
    }

    /// Validate the provided arguments
    pub fn validate(&self) -> Result<(), String> {
        // Validate the handshake deadline
        if self.handshake_timeout_ms == 0 {
            return Err("Handshake timeout must be greater than 0 milliseconds".to_string());
        }

        if self.handshake_timeout_ms > 300_000 {
            return Err("Handshake timeout cannot exceed 300000 ms (5 minutes)".to_string());
        }

        // Validate the version range
        if self.min_network_version > self.max_network_version {
            return Err(format!(
                "Minimum network version ({}) cannot exceed maximum ({})",
                self.min_network_version, self.max_network_version
            ));
        }

        // Validate the message size ceiling; a handshake payload with keys
        // and a signature does not fit under a few hundred bytes
        if self.max_message_size < 512 {
            return Err("Maximum message size must be at least 512 bytes".to_string());
        }

        // Validate max retries
        if self.max_retries == 0 {
            return Err("Maximum retries must be at least 1".to_string());
        }

        if self.max_retries > 10 {
            return Err("Maximum retries cannot exceed 10".to_string());
        }

        // Validate peer addresses for client mode
        if matches!(self.mode, ApplicationMode::Client) && self.peer_addresses.is_empty() {
            return Err("Client mode requires at least one peer address (--peers)".to_string());
        }

        // Validate peer address formats (can be IP:port or hostname:port)
        for addr in &self.peer_addresses {
            if !addr.contains(':') {
                return Err(format!(
                    "Invalid peer address format '{}'. Must include port (e.g., host:5160)",
                    addr
                ));
            }
        }

        // Validate continuous mode interval
        if self.continuous && self.interval_secs < 10 {
            return Err("Continuous mode interval must be at least 10 seconds".to_string());
        }

        Ok(())
    }
}

/// Application operating mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationMode {
    /// Client mode - initiate handshakes with peers
    Client,
    /// Server mode - listen and respond to handshakes
    Server,
}

impl FromStr for ApplicationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" | "c" => Ok(ApplicationMode::Client),
            "server" | "s" | "listen" => Ok(ApplicationMode::Server),
            _ => Err(format!(
                "Invalid application mode: '{}'. Valid options: client, server",
                s
            )),
        }
    }
}

/// Log level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!(
                "Invalid log level: '{}'. Valid options: trace, debug, info, warn, error",
                s
            )),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty formatted logs for development
    Pretty,
    /// JSON formatted logs for production
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" | "human" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: pretty, json",
                s
            )),
        }
    }
}
