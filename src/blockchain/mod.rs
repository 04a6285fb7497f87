// Blockchain module
//
// This module contains the ledger core:
// - Canonical hashing
// - Keys, signing and verification
// - Transaction structure
// - Mempool admission
// - Block structure and proof of work
// - Chain validation, fork resolution and balance projection

pub mod block;
pub mod chain;
pub mod crypto;
pub mod hasher;
pub mod mempool;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, BlockError};
pub use chain::{Blockchain, BlockchainError, ChainConfig, Selection};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use mempool::{Mempool, MempoolError};
pub use transaction::{Transaction, TransactionError};
