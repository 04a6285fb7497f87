use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::hasher::{hash_value, meets_difficulty};
use super::transaction::{Transaction, TransactionError};

/// Wire schema version understood by this node
pub const BLOCK_VERSION: u32 = 1;

/// Nonces tried between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Reasons a block fails validation
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Stored hash {stored} does not match computed hash {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("Hash {hash} does not meet difficulty {difficulty}")]
    InvalidProofOfWork { hash: String, difficulty: u32 },

    #[error("Invalid transaction {id}: {source}")]
    InvalidTransaction {
        id: String,
        #[source]
        source: TransactionError,
    },

    #[error("Coinbase transaction at position {0}")]
    MisplacedCoinbase(usize),
}

/// Represents a block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct Block {
    /// Version of the block structure
    #[serde(default = "default_version")]
    pub version: u32,

    /// Position of the block in the chain, genesis is 1
    pub index: u64,

    /// Creation time in microseconds since the Unix epoch
    pub timestamp: i64,

    /// Transactions in the block, coinbase first if present
    pub transactions: Vec<Transaction>,

    /// Proof of work
    pub nonce: u64,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Required number of leading zero hex characters
    pub difficulty: u32,

    /// Hash of the current block
    pub hash: String,
}

fn default_version() -> u32 {
    BLOCK_VERSION
}

impl Block {
    /// Creates an unmined block
    ///
    /// The hash is left empty until [`Block::proof_of_work`] finds a nonce.
    pub fn new(index: u64, timestamp: i64, transactions: Vec<Transaction>, previous_hash: String, difficulty: u32) -> Self {
        Block {
            version: default_version(),
            index,
            timestamp,
            transactions,
            nonce: 0,
            previous_hash,
            difficulty,
            hash: String::new(),
        }
    }

    /// Everything the hash commits to except the nonce
    fn hash_base(&self) -> Map<String, Value> {
        let mut base = Map::new();
        base.insert("index".to_string(), Value::from(self.index));
        base.insert(
            "transactions".to_string(),
            Value::Array(self.transactions.iter().map(Transaction::payload).collect()),
        );
        base.insert("previous_hash".to_string(), Value::from(self.previous_hash.clone()));
        base.insert("difficulty".to_string(), Value::from(self.difficulty));
        base.insert("timestamp".to_string(), Value::from(self.timestamp));
        base
    }

    fn hash_with_nonce(base: &mut Map<String, Value>, nonce: u64) -> String {
        base.insert("nonce".to_string(), Value::from(nonce));
        // Taken back out so the caller can reuse the map for the next nonce
        let value = Value::Object(std::mem::take(base));
        let hash = hash_value(&value);
        if let Value::Object(map) = value {
            *base = map;
        }
        hash
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let mut base = self.hash_base();
        Self::hash_with_nonce(&mut base, self.nonce)
    }

    /// Searches nonces from zero until the hash meets the difficulty
    ///
    /// The token, if given, is polled periodically; a cancelled search
    /// returns false and leaves the block unmined.
    pub fn proof_of_work(&mut self, cancel: Option<&CancellationToken>) -> bool {
        let mut base = self.hash_base();
        let mut nonce = 0u64;

        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.map_or(false, |t| t.is_cancelled()) {
                return false;
            }

            let hash = Self::hash_with_nonce(&mut base, nonce);
            if meets_difficulty(&hash, self.difficulty) {
                self.nonce = nonce;
                self.hash = hash;
                return true;
            }

            nonce += 1;
        }
    }

    /// Checks hash integrity, proof of work and every transaction
    ///
    /// Proof of work is measured against the block's own `difficulty`, not
    /// the local network setting, so a peer may present easier blocks.
    pub fn check(&self) -> Result<(), BlockError> {
        let computed = self.calculate_hash();
        if computed != self.hash {
            return Err(BlockError::HashMismatch {
                stored: self.hash.clone(),
                computed,
            });
        }

        if !meets_difficulty(&self.hash, self.difficulty) {
            return Err(BlockError::InvalidProofOfWork {
                hash: self.hash.clone(),
                difficulty: self.difficulty,
            });
        }

        for (position, transaction) in self.transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                if position > 0 {
                    return Err(BlockError::MisplacedCoinbase(position));
                }
                continue;
            }

            transaction.check().map_err(|source| BlockError::InvalidTransaction {
                id: transaction.id.clone(),
                source,
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }
}
