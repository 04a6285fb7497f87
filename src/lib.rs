//! A minimal proof-of-work ledger.
//!
//! Signed transfers are admitted to a mempool, packed behind a coinbase
//! reward into blocks sealed by a leading-zero hash puzzle, and reconciled
//! between replicas with the longest valid chain. Balances are never stored;
//! they are replayed from the chain on every query.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod node;
