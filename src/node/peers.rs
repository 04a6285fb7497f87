//! Static peer registry and best-effort gossip.
//!
//! Peers are only ever added from configuration or the register endpoint;
//! nothing is discovered. Every outbound call has its own timeout and a
//! failure is logged and forgotten.

use std::time::Duration;

use awc::Client;
use dashmap::DashSet;
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blockchain::{Block, Transaction};

/// Largest chain response accepted from a peer
const MAX_CHAIN_PAYLOAD: usize = 64 * 1024 * 1024;

/// Known peer base URLs
#[derive(Debug)]
pub struct PeerRegistry {
    peers: DashSet<String>,
    self_url: String,
}

impl PeerRegistry {
    pub fn new(self_url: impl Into<String>) -> Self {
        PeerRegistry {
            peers: DashSet::new(),
            self_url: normalize(&self_url.into()).unwrap_or_default(),
        }
    }

    /// Adds peers, ignoring blanks, duplicates and this node itself
    ///
    /// # Returns
    ///
    /// The number of peers that were new
    pub fn register<I, S>(&self, peers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for peer in peers {
            if let Some(url) = normalize(peer.as_ref()) {
                if url != self.self_url && self.peers.insert(url) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Registered peers in sorted order
    pub fn list(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|p| p.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Turns `host:port` or a URL into `http://host:port` without a trailing slash
pub fn normalize(peer: &str) -> Option<String> {
    let peer = peer.trim();
    if peer.is_empty() {
        return None;
    }

    let url = if peer.starts_with("http://") || peer.starts_with("https://") {
        peer.to_string()
    } else {
        format!("http://{}", peer)
    };

    Some(url.trim_end_matches('/').to_string())
}

/// Response shape of a peer's `/blocks` endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct PeerChain {
    pub chain: Vec<Value>,
    #[serde(default)]
    pub length: usize,
}

async fn post_all<T: Serialize>(peers: &[String], path: &str, payload: &T, timeout: Duration) -> usize {
    let client = Client::builder().timeout(timeout).finish();

    let requests = peers.iter().map(|peer| {
        let client = &client;
        async move {
            let url = format!("{}{}", peer, path);
            match client.post(url.as_str()).send_json(payload).await {
                Ok(response) if response.status().is_success() => {
                    debug!("Delivered {} to {}", path, peer);
                    true
                }
                Ok(response) => {
                    warn!("Peer {} rejected {} (HTTP {})", peer, path, response.status());
                    false
                }
                Err(err) => {
                    warn!("Failed to reach {} for {}: {}", peer, path, err);
                    false
                }
            }
        }
    });

    join_all(requests).await.into_iter().filter(|delivered| *delivered).count()
}

/// Sends a freshly mined block to every peer
///
/// # Returns
///
/// How many peers accepted it
pub async fn broadcast_block(peers: &[String], block: &Block, timeout: Duration) -> usize {
    post_all(peers, "/nodes/receive_block", block, timeout).await
}

/// Relays an accepted transaction to every peer
pub async fn broadcast_transaction(peers: &[String], transaction: &Transaction, timeout: Duration) -> usize {
    post_all(peers, "/nodes/receive_tx", transaction, timeout).await
}

/// Downloads every reachable peer's chain as raw block payloads
///
/// Unreachable peers and unreadable responses are skipped.
pub async fn fetch_chains(peers: &[String], timeout: Duration) -> Vec<Vec<Value>> {
    let client = Client::builder().timeout(timeout).finish();

    let requests = peers.iter().map(|peer| {
        let client = &client;
        async move {
            let url = format!("{}/blocks", peer);
            let mut response = match client.get(url.as_str()).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!("Failed to fetch chain from {}: {}", peer, err);
                    return None;
                }
            };

            if !response.status().is_success() {
                warn!("Peer {} answered HTTP {} for its chain", peer, response.status());
                return None;
            }

            match response.json::<PeerChain>().limit(MAX_CHAIN_PAYLOAD).await {
                Ok(body) => Some(body.chain),
                Err(err) => {
                    warn!("Unreadable chain from {}: {}", peer, err);
                    None
                }
            }
        }
    });

    join_all(requests).await.into_iter().flatten().collect()
}
