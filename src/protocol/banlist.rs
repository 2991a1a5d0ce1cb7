//! Banlist dependency: consumed read-only during handshake validation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Offenses before an entry is banned by [`InMemoryBanList::record_offense`]
const OFFENSE_THRESHOLD: u32 = 3;

/// Query/update surface of the banlist store.
///
/// The handshake layer only ever reads it; offense recording is driven by
/// the external peer manager based on repeated rejection patterns. Reads
/// must tolerate arbitrarily many concurrent handshake attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BanList: Send + Sync {
    /// True when either the claimed peer id or the claimed address is banned.
    async fn is_banned(&self, peer_id: &str, ip: &str) -> bool;

    /// Note an offense against a peer; repeat offenders get banned.
    async fn record_offense(&self, peer_id: &str, ip: &str);
}

/// A banlist that bans nobody. Useful default for clients and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBanList;

#[async_trait]
impl BanList for NoBanList {
    async fn is_banned(&self, _peer_id: &str, _ip: &str) -> bool {
        false
    }

    async fn record_offense(&self, _peer_id: &str, _ip: &str) {}
}

#[derive(Debug, Default)]
struct BanState {
    banned: HashSet<String>,
    offenses: HashMap<String, u32>,
}

/// In-memory banlist. Entry writes are atomic under a single lock; replace
/// with a persistent store behind the same trait when reputation needs to
/// survive restarts.
#[derive(Debug, Default)]
pub struct InMemoryBanList {
    state: RwLock<BanState>,
}

impl InMemoryBanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban an entry (peer id or address) outright.
    pub async fn ban(&self, entry: &str) {
        self.state.write().await.banned.insert(entry.to_string());
    }

    /// Lift a ban and forget recorded offenses for the entry.
    pub async fn unban(&self, entry: &str) {
        let mut state = self.state.write().await;
        state.banned.remove(entry);
        state.offenses.remove(entry);
    }
}

#[async_trait]
impl BanList for InMemoryBanList {
    async fn is_banned(&self, peer_id: &str, ip: &str) -> bool {
        let state = self.state.read().await;
        state.banned.contains(peer_id) || state.banned.contains(ip)
    }

    async fn record_offense(&self, peer_id: &str, ip: &str) {
        let mut state = self.state.write().await;
        for entry in [peer_id, ip] {
            let count = state.offenses.entry(entry.to_string()).or_insert(0);
            *count += 1;
            if *count >= OFFENSE_THRESHOLD {
                state.banned.insert(entry.to_string());
            }
        }
    }
}
