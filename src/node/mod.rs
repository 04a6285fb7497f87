// Node module
//
// The concurrency boundary around the ledger core: one lock over the chain
// and the mempool, proof of work on the blocking pool, and import of blocks
// and chains received from peers.

pub mod peers;

use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::blockchain::block::BLOCK_VERSION;
use crate::blockchain::transaction::TRANSACTION_VERSION;
use crate::blockchain::{Address, Block, Blockchain, BlockchainError, Mempool, MempoolError, Transaction};
use crate::config::NodeConfig;

pub use peers::PeerRegistry;

/// Chain and mempool, always locked together
#[derive(Debug)]
struct LedgerState {
    blockchain: Blockchain,
    mempool: Mempool,
}

/// Clears the mining slot and stops the search when mining ends or is abandoned
struct MiningGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for MiningGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.slot.lock().take() {
            token.cancel();
        }
    }
}

/// A ledger replica shared by every request handler
#[derive(Debug)]
pub struct Node {
    state: Mutex<LedgerState>,
    mining: Mutex<Option<CancellationToken>>,
    peers: PeerRegistry,
    miner_address: Address,
    max_block_transactions: usize,
    allow_empty_blocks: bool,
    network_timeout: Duration,
}

impl Node {
    /// Creates a node with a fresh genesis chain and the configured peers
    pub fn new(config: &NodeConfig) -> Self {
        let peers = PeerRegistry::new(config.self_url());
        peers.register(&config.bootstrap_peers);

        Node {
            state: Mutex::new(LedgerState {
                blockchain: Blockchain::new(config.chain_config()),
                mempool: Mempool::new(),
            }),
            mining: Mutex::new(None),
            peers,
            miner_address: config.miner_address(),
            max_block_transactions: config.max_block_transactions,
            allow_empty_blocks: config.allow_empty_blocks,
            network_timeout: config.network_timeout(),
        }
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn miner_address(&self) -> &Address {
        &self.miner_address
    }

    pub fn network_timeout(&self) -> Duration {
        self.network_timeout
    }

    /// Snapshot of the chain
    pub fn chain(&self) -> Vec<Block> {
        self.state.lock().blockchain.blocks().to_vec()
    }

    /// Snapshot of the pending transactions
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().mempool.all().to_vec()
    }

    pub fn balance_of(&self, address: &Address) -> f64 {
        self.state.lock().blockchain.balance_of(address)
    }

    /// Offers a transaction to the mempool
    ///
    /// With `check_balance` the sender's derived balance, net of their other
    /// pending spends, must cover the amount.
    pub fn submit_transaction(&self, transaction: Transaction, check_balance: bool) -> Result<(), MempoolError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let ledger = check_balance.then_some(&state.blockchain);
        state.mempool.add(transaction, ledger)
    }

    pub fn is_mining(&self) -> bool {
        self.mining.lock().is_some()
    }

    /// Stops the running proof-of-work search, if any
    pub fn cancel_mining(&self) -> bool {
        match self.mining.lock().as_ref() {
            Some(token) => {
                info!("Cancelling block search");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn begin_mining(&self) -> Result<(MiningGuard<'_>, CancellationToken), BlockchainError> {
        let mut slot = self.mining.lock();
        if slot.is_some() {
            return Err(BlockchainError::MiningInProgress);
        }

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok((MiningGuard { slot: &self.mining }, token))
    }

    /// Mines the next block from the mempool and appends it
    ///
    /// The lock is only held while the candidate is assembled and while it
    /// is appended; the search itself runs on the blocking pool. If another
    /// block lands in the meantime the result is rejected as stale.
    pub async fn mine(&self) -> Result<Block, BlockchainError> {
        let (_guard, token) = self.begin_mining()?;
        self.mine_with(token).await
    }

    async fn mine_with(&self, token: CancellationToken) -> Result<Block, BlockchainError> {
        let mut candidate = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.mempool.is_empty() && !self.allow_empty_blocks {
                return Err(BlockchainError::EmptyMempool);
            }

            let pending = state.mempool.take(self.max_block_transactions);
            let selection = state.blockchain.select_transactions(&pending);
            state.mempool.remove(&selection.rejected[..]);

            if !pending.is_empty() && selection.transactions.is_empty() && !self.allow_empty_blocks {
                return Err(BlockchainError::NoValidTransactions);
            }

            state.blockchain.candidate_block(&self.miner_address, selection.transactions)
        };

        info!(
            "Mining block {} with {} transactions at difficulty {}",
            candidate.index,
            candidate.transactions.len(),
            candidate.difficulty
        );

        let (block, found) = tokio::task::spawn_blocking(move || {
            let found = candidate.proof_of_work(Some(&token));
            (candidate, found)
        })
        .await
        .map_err(|e| BlockchainError::SystemError(e.to_string()))?;

        if !found {
            warn!("Block search for index {} was cancelled", block.index);
            return Err(BlockchainError::MiningCancelled);
        }

        let mut state = self.state.lock();
        state.blockchain.append(block.clone())?;

        let mined: Vec<&str> = block.transactions.iter().map(|t| t.id.as_str()).collect();
        state.mempool.remove(&mined[..]);

        Ok(block)
    }

    /// Appends a block received from a peer
    ///
    /// On success its transactions leave the mempool, along with any pending
    /// spend the new tip can no longer fund.
    pub fn import_block(&self, block: Block) -> Result<(), BlockchainError> {
        let mut state = self.state.lock();

        let ids: Vec<String> = block.transactions.iter().map(|t| t.id.clone()).collect();
        if let Err(err) = state.blockchain.append(block) {
            warn!("Rejected block from peer: {}", err);
            return Err(err);
        }

        state.mempool.remove(&ids[..]);
        evict_stale(&mut state);
        Ok(())
    }

    /// Runs fork resolution over raw candidate chains
    ///
    /// Candidates that do not decode are skipped. After a replacement any
    /// pending transaction the adopted chain already holds or can no longer
    /// fund is evicted.
    pub fn import_chain(&self, candidates: Vec<Vec<Value>>) -> bool {
        let decoded: Vec<Vec<Block>> = candidates
            .into_iter()
            .enumerate()
            .filter_map(|(position, payloads)| match decode_chain(payloads) {
                Ok(chain) => Some(chain),
                Err(err) => {
                    warn!("Skipping candidate chain {}: {}", position, err);
                    None
                }
            })
            .collect();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.blockchain.resolve_conflicts(decoded) {
            return false;
        }

        evict_stale(state);
        true
    }
}

/// Drops pending transactions that the current tip can never include
///
/// Run after the tip moves under the mempool, so a spend that lost a race
/// against a peer's block stops counting against its sender.
fn evict_stale(state: &mut LedgerState) {
    let selection = state.blockchain.select_transactions(state.mempool.all());
    if !selection.rejected.is_empty() {
        info!("Evicting {} stale pending transactions", selection.rejected.len());
        state.mempool.remove(&selection.rejected[..]);
    }
}

/// Decodes a peer's block payload against the versioned wire schema
pub fn decode_block(payload: Value) -> Result<Block, BlockchainError> {
    let block: Block =
        serde_json::from_value(payload).map_err(|e| BlockchainError::MalformedPayload(e.to_string()))?;

    if block.version != BLOCK_VERSION {
        return Err(BlockchainError::MalformedPayload(format!(
            "Unsupported block version {}",
            block.version
        )));
    }

    if let Some(transaction) = block.transactions.iter().find(|t| t.version != TRANSACTION_VERSION) {
        return Err(BlockchainError::MalformedPayload(format!(
            "Unsupported transaction version {} in {}",
            transaction.version, transaction.id
        )));
    }

    Ok(block)
}

/// Decodes a peer's transaction payload against the versioned wire schema
pub fn decode_transaction(payload: Value) -> Result<Transaction, BlockchainError> {
    let transaction: Transaction =
        serde_json::from_value(payload).map_err(|e| BlockchainError::MalformedPayload(e.to_string()))?;

    if transaction.version != TRANSACTION_VERSION {
        return Err(BlockchainError::MalformedPayload(format!(
            "Unsupported transaction version {}",
            transaction.version
        )));
    }

    Ok(transaction)
}

fn decode_chain(payloads: Vec<Value>) -> Result<Vec<Block>, BlockchainError> {
    payloads.into_iter().map(decode_block).collect()
}
