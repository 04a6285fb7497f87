use std::time::Duration;

use clap::Parser;

use crate::blockchain::{Address, ChainConfig};

/// Runtime configuration for a ledger node
///
/// Every flag can also be given through the environment variable named next
/// to it.
#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = "Minimal proof-of-work ledger node")]
pub struct NodeConfig {
    /// Interface the HTTP server binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the HTTP server listens on.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Host name peers use to reach this node, used to avoid registering ourselves.
    #[arg(long, env = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Comma separated peers, as `host:port` or full URLs.
    #[arg(short, long, env = "BOOTSTRAP_PEERS", value_delimiter = ',')]
    pub bootstrap_peers: Vec<String>,

    /// Leading zero hex characters required in block hashes.
    #[arg(short, long, env = "DIFFICULTY", default_value_t = 4)]
    pub difficulty: u32,

    /// Reward paid to the miner of each block.
    #[arg(long, env = "COINBASE_AMOUNT", default_value_t = 50.0)]
    pub mining_reward: f64,

    /// Per-peer timeout in seconds for gossip and chain fetches.
    #[arg(long, env = "NETWORK_TIMEOUT", default_value_t = 5)]
    pub network_timeout: u64,

    /// Address credited by blocks this node mines, `node-{port}` by default.
    #[arg(long, env = "MINER_ADDRESS")]
    pub miner_address: Option<String>,

    /// Upper bound on pending transactions packed into one block.
    #[arg(long, env = "MAX_BLOCK_TRANSACTIONS", default_value_t = 100)]
    pub max_block_transactions: usize,

    /// Mine coinbase-only blocks when the mempool is empty (needed to bootstrap a network).
    #[arg(long, env = "ALLOW_EMPTY_BLOCKS")]
    pub allow_empty_blocks: bool,
}

impl NodeConfig {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
        }
    }

    pub fn miner_address(&self) -> Address {
        match &self.miner_address {
            Some(address) => Address(address.clone()),
            None => Address(format!("node-{}", self.port)),
        }
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout)
    }

    /// URL this node is reachable at
    pub fn self_url(&self) -> String {
        let hostname = self
            .hostname
            .clone()
            .unwrap_or_else(|| format!("node{}", self.port));
        format!("http://{}:{}", hostname, self.port)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let chain = ChainConfig::default();
        NodeConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            hostname: None,
            bootstrap_peers: Vec::new(),
            difficulty: chain.difficulty,
            mining_reward: chain.mining_reward,
            network_timeout: 5,
            miner_address: None,
            max_block_transactions: 100,
            allow_empty_blocks: false,
        }
    }
}
