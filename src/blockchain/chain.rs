use std::collections::HashMap;

use log::{info, warn};
use thiserror::Error;

use super::block::{Block, BlockError};
use super::crypto::Address;
use super::transaction::{now_micros, Transaction};

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Fixed so that every node derives the same genesis block
pub const GENESIS_TIMESTAMP: i64 = 0;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Mempool is empty, nothing to mine")]
    EmptyMempool,

    #[error("No pending transaction is currently valid")]
    NoValidTransactions,

    #[error("Block does not link to the chain tip: expected previous hash {expected}, got {got}")]
    InvalidBlockLinkage { expected: String, got: String },

    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("A block is already being mined")]
    MiningInProgress,

    #[error("Mining was cancelled")]
    MiningCancelled,

    #[error("System error: {0}")]
    SystemError(String),
}

/// Outcome of replaying pending transactions against the chain tip
#[derive(Debug, Default)]
pub struct Selection {
    /// Admissible transactions, in arrival order
    pub transactions: Vec<Transaction>,

    /// Ids of pending transactions that can never enter a block on this tip
    pub rejected: Vec<String>,
}

/// Consensus parameters shared by every node of a network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainConfig {
    /// Leading zero hex characters required of every block hash
    pub difficulty: u32,

    /// Amount credited by each coinbase transaction
    pub mining_reward: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            mining_reward: 50.0,
        }
    }
}

/// The ledger: an ordered, linked sequence of blocks
///
/// Balances are never stored; they are replayed from the blocks on demand.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
    config: ChainConfig,
}

impl Blockchain {
    /// Creates a ledger holding only the genesis block
    pub fn new(config: ChainConfig) -> Self {
        Blockchain {
            chain: vec![Self::genesis_block(config.difficulty)],
            config,
        }
    }

    /// Mines the genesis block for a difficulty
    pub fn genesis_block(difficulty: u32) -> Block {
        let mut genesis = Block::new(
            1,
            GENESIS_TIMESTAMP,
            Vec::new(),
            GENESIS_PREVIOUS_HASH.to_string(),
            difficulty,
        );
        genesis.proof_of_work(None);
        genesis
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Appends a block that extends the tip
    ///
    /// Nothing changes unless the block links to the tip and validates.
    pub fn append(&mut self, block: Block) -> Result<(), BlockchainError> {
        let tip = self.last_block();
        if block.previous_hash != tip.hash {
            return Err(BlockchainError::InvalidBlockLinkage {
                expected: tip.hash.clone(),
                got: block.previous_hash,
            });
        }

        block.check()?;

        info!(
            "Appended block {} ({}) with {} transactions",
            block.index,
            block.hash,
            block.transactions.len()
        );
        self.chain.push(block);
        Ok(())
    }

    /// Checks linkage and validity of every block in a sequence
    ///
    /// The first block is not compared with the local genesis.
    pub fn is_valid_chain(blocks: &[Block]) -> bool {
        if blocks.is_empty() {
            return false;
        }

        if !blocks.iter().all(Block::validate) {
            return false;
        }

        blocks
            .windows(2)
            .all(|pair| pair[1].previous_hash == pair[0].hash)
    }

    /// Validates the local chain
    pub fn is_valid(&self) -> bool {
        Self::is_valid_chain(&self.chain)
    }

    /// Applies the longest-chain rule
    ///
    /// The first candidate that is strictly longer than the local chain and
    /// fully valid replaces it; every other candidate is discarded.
    ///
    /// # Returns
    ///
    /// true if the local chain was replaced
    pub fn resolve_conflicts(&mut self, candidates: Vec<Vec<Block>>) -> bool {
        let current_length = self.chain.len();

        for (position, candidate) in candidates.into_iter().enumerate() {
            if candidate.len() <= current_length {
                continue;
            }

            if !Self::is_valid_chain(&candidate) {
                warn!(
                    "Rejected candidate chain {} of length {}: invalid",
                    position,
                    candidate.len()
                );
                continue;
            }

            info!(
                "Replacing chain of length {} with candidate of length {}",
                current_length,
                candidate.len()
            );
            self.chain = candidate;
            return true;
        }

        false
    }

    /// Derives an address's balance by replaying every transaction
    pub fn balance_of(&self, address: &Address) -> f64 {
        let mut balance = 0.0;

        for transaction in self.chain.iter().flat_map(|b| b.transactions.iter()) {
            if !transaction.is_coinbase() && &transaction.sender == address {
                balance -= transaction.amount;
            }
            if &transaction.recipient == address {
                balance += transaction.amount;
            }
        }

        balance
    }

    /// Returns true if any block contains a transaction with this id
    pub fn contains_transaction(&self, id: &str) -> bool {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .any(|t| t.id == id)
    }

    /// Picks the pending transactions that can go into the next block
    ///
    /// Pending entries are replayed in arrival order against running sender
    /// balances, so one that an earlier pending spend has already drained is
    /// rejected here even though it passed admission. Entries already on the
    /// chain or failing `check` are rejected too.
    pub fn select_transactions(&self, pending: &[Transaction]) -> Selection {
        let mut spendable: HashMap<&Address, f64> = HashMap::new();
        let mut selection = Selection::default();

        for transaction in pending {
            if transaction.is_coinbase() || self.contains_transaction(&transaction.id) {
                selection.rejected.push(transaction.id.clone());
                continue;
            }

            if let Err(err) = transaction.check() {
                warn!("Dropping pending transaction {}: {}", transaction.id, err);
                selection.rejected.push(transaction.id.clone());
                continue;
            }

            let available = spendable
                .entry(&transaction.sender)
                .or_insert_with(|| self.balance_of(&transaction.sender));

            if *available < transaction.amount {
                warn!(
                    "Dropping pending transaction {}: balance {} cannot cover {}",
                    transaction.id, available, transaction.amount
                );
                selection.rejected.push(transaction.id.clone());
                continue;
            }

            *available -= transaction.amount;
            selection.transactions.push(transaction.clone());
        }

        selection
    }

    /// Builds the next, still unmined, block paying the reward to `miner`
    pub fn candidate_block(&self, miner: &Address, transactions: Vec<Transaction>) -> Block {
        let tip = self.last_block();
        let coinbase = Transaction::new_coinbase(miner.clone(), self.config.mining_reward);

        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(coinbase);
        all.extend(transactions);

        Block::new(tip.index + 1, now_micros(), all, tip.hash.clone(), self.config.difficulty)
    }

    /// Mines and appends a block in the calling thread
    ///
    /// An empty pending list still produces a coinbase-only block.
    pub fn mine_block(&mut self, miner: &Address, pending: &[Transaction]) -> Result<Block, BlockchainError> {
        let selection = self.select_transactions(pending);
        if !pending.is_empty() && selection.transactions.is_empty() {
            return Err(BlockchainError::NoValidTransactions);
        }

        let mut block = self.candidate_block(miner, selection.transactions);
        block.proof_of_work(None);

        self.append(block.clone())?;
        Ok(block)
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}
