use log::debug;
use thiserror::Error;

use super::chain::Blockchain;
use super::transaction::{Transaction, TransactionError};

/// Reasons a transaction is refused admission
#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("Invalid transaction: {0}")]
    InvalidSignature(#[from] TransactionError),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Coinbase transactions are created by mining only")]
    CoinbaseNotAllowed,
}

/// Transactions admitted but not yet mined, in arrival order
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a transaction
    ///
    /// With a ledger supplied, the sender's derived balance minus whatever
    /// they already have pending must cover the amount.
    pub fn add(&mut self, transaction: Transaction, ledger: Option<&Blockchain>) -> Result<(), MempoolError> {
        if transaction.is_coinbase() {
            return Err(MempoolError::CoinbaseNotAllowed);
        }

        transaction.check()?;

        if let Some(ledger) = ledger {
            let pending_out: f64 = self
                .transactions
                .iter()
                .filter(|t| t.sender == transaction.sender && t.id != transaction.id)
                .map(|t| t.amount)
                .sum();
            let available = ledger.balance_of(&transaction.sender) - pending_out;

            if available < transaction.amount {
                return Err(MempoolError::InsufficientBalance {
                    required: transaction.amount,
                    available,
                });
            }
        }

        if self.contains(&transaction.id) {
            return Err(MempoolError::DuplicateTransaction(transaction.id));
        }

        debug!("Admitted transaction {} to mempool", transaction.id);
        self.transactions.push(transaction);
        Ok(())
    }

    /// Evicts transactions by id
    pub fn remove<S: AsRef<str>>(&mut self, ids: &[S]) {
        let before = self.transactions.len();
        self.transactions
            .retain(|t| !ids.iter().any(|id| id.as_ref() == t.id));

        let removed = before - self.transactions.len();
        if removed > 0 {
            debug!("Evicted {} transactions from mempool", removed);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|t| t.id == id)
    }

    pub fn all(&self) -> &[Transaction] {
        &self.transactions
    }

    /// The oldest `limit` pending transactions
    pub fn take(&self, limit: usize) -> Vec<Transaction> {
        self.transactions.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain::ChainConfig;
    use crate::blockchain::crypto::Wallet;

    fn signed(wallet: &Wallet, amount: f64) -> Transaction {
        let mut transaction = Transaction::new(wallet.address().clone(), Wallet::new().address().clone(), amount);
        transaction.sign(wallet).unwrap();
        transaction
    }

    fn funded_ledger(wallet: &Wallet) -> Blockchain {
        let mut ledger = Blockchain::new(ChainConfig { difficulty: 1, mining_reward: 50.0 });
        ledger.mine_block(wallet.address(), &[]).unwrap();
        ledger
    }

    #[test]
    fn test_add_and_remove() {
        let wallet = Wallet::new();
        let mut mempool = Mempool::new();
        let transaction = signed(&wallet, 5.0);
        let id = transaction.id.clone();

        mempool.add(transaction, None).unwrap();
        assert_eq!(mempool.all().len(), 1);

        mempool.remove(&[id]);
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_rejects_invalid_signature() {
        let wallet = Wallet::new();
        let mut transaction = signed(&wallet, 5.0);
        transaction.signature = None;

        let result = Mempool::new().add(transaction, None);
        assert!(matches!(result, Err(MempoolError::InvalidSignature(_))));
    }

    #[test]
    fn test_rejects_duplicates() {
        let wallet = Wallet::new();
        let mut mempool = Mempool::new();
        let transaction = signed(&wallet, 5.0);

        mempool.add(transaction.clone(), None).unwrap();
        let result = mempool.add(transaction, None);

        assert!(matches!(result, Err(MempoolError::DuplicateTransaction(_))));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_rejects_coinbase() {
        let transaction = Transaction::new_coinbase(Wallet::new().address().clone(), 50.0);
        let result = Mempool::new().add(transaction, None);
        assert!(matches!(result, Err(MempoolError::CoinbaseNotAllowed)));
    }

    #[test]
    fn test_balance_check_counts_pending_spends() {
        let wallet = Wallet::new();
        let ledger = funded_ledger(&wallet);
        let mut mempool = Mempool::new();

        mempool.add(signed(&wallet, 30.0), Some(&ledger)).unwrap();
        let result = mempool.add(signed(&wallet, 30.0), Some(&ledger));

        match result {
            Err(MempoolError::InsufficientBalance { required, available }) => {
                assert_eq!(required, 30.0);
                assert_eq!(available, 20.0);
            }
            other => panic!("expected insufficient balance, got {:?}", other),
        }

        mempool.add(signed(&wallet, 20.0), Some(&ledger)).unwrap();
        assert_eq!(mempool.len(), 2);
    }

    #[test]
    fn test_unfunded_sender_is_rejected_with_ledger() {
        let ledger = Blockchain::new(ChainConfig { difficulty: 1, mining_reward: 50.0 });
        let result = Mempool::new().add(signed(&Wallet::new(), 1.0), Some(&ledger));
        assert!(matches!(result, Err(MempoolError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_take_preserves_arrival_order() {
        let wallet = Wallet::new();
        let mut mempool = Mempool::new();
        let ids: Vec<String> = (1..=3)
            .map(|i| {
                let transaction = signed(&wallet, i as f64);
                let id = transaction.id.clone();
                mempool.add(transaction, None).unwrap();
                id
            })
            .collect();

        let taken: Vec<String> = mempool.take(2).into_iter().map(|t| t.id).collect();
        assert_eq!(taken, ids[..2].to_vec());
        assert_eq!(mempool.take(10).len(), 3);
        assert_eq!(mempool.len(), 3);
    }
}
