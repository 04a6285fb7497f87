use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{Address, CryptoError, DigitalSignature, Ed25519Verifier, SignatureVerifier, Wallet};
use super::hasher::hash_value;

/// Wire schema version understood by this node
pub const TRANSACTION_VERSION: u32 = 1;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Transaction not signed")]
    NotSigned,

    #[error("Transaction id {stored} does not match its content ({computed})")]
    IdMismatch { stored: String, computed: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Invalid sender address: {0}")]
    InvalidSenderAddress(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Represents a signed value transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    /// Version of the transaction structure
    #[serde(default = "default_version")]
    pub version: u32,

    /// Canonical hash of sender, recipient, amount and timestamp
    pub id: String,

    /// Sender's address (public key), or `coinbase` for rewards
    #[schema(value_type = String)]
    pub sender: Address,

    /// Recipient's address (public key)
    #[schema(value_type = String)]
    pub recipient: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Creation time in microseconds since the Unix epoch
    pub timestamp: i64,

    /// Signature over `id`
    #[schema(value_type = String, nullable)]
    pub signature: Option<DigitalSignature>,
}

fn default_version() -> u32 {
    TRANSACTION_VERSION
}

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

impl Transaction {
    /// Creates a new unsigned transaction stamped with the current time
    pub fn new(sender: Address, recipient: Address, amount: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, now_micros())
    }

    /// Creates a new unsigned transaction with an explicit timestamp
    pub fn with_timestamp(sender: Address, recipient: Address, amount: f64, timestamp: i64) -> Self {
        let mut transaction = Transaction {
            version: default_version(),
            id: String::new(),
            sender,
            recipient,
            amount,
            timestamp,
            signature: None,
        };
        transaction.id = transaction.calculate_id();
        transaction
    }

    /// Creates a mining reward transaction
    pub fn new_coinbase(recipient: Address, amount: f64) -> Self {
        Self::new(Address::coinbase(), recipient, amount)
    }

    /// Computes the transaction's identity
    ///
    /// The signature is not part of the id.
    pub fn calculate_id(&self) -> String {
        hash_value(&serde_json::json!({
            "sender": self.sender.0,
            "recipient": self.recipient.0,
            "amount": self.amount,
            "timestamp": self.timestamp,
        }))
    }

    /// The digest a wallet signs (identical to the id)
    pub fn signing_hash(&self) -> String {
        self.calculate_id()
    }

    /// Signs the transaction with a wallet
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if wallet.address() != &self.sender {
            return Err(TransactionError::InvalidSenderAddress(
                "Wallet address does not match sender address".to_string(),
            ));
        }

        let signature = wallet.sign(&self.signing_hash())?;
        self.signature = Some(signature);
        self.id = self.calculate_id();

        Ok(())
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender.is_coinbase()
    }

    /// Checks the transaction with the default Ed25519 verifier
    pub fn check(&self) -> Result<(), TransactionError> {
        self.check_with(&Ed25519Verifier)
    }

    /// Checks the transaction, reporting why it is invalid
    pub fn check_with<V: SignatureVerifier>(&self, verifier: &V) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(TransactionError::InvalidAmount(self.amount));
        }

        let computed = self.calculate_id();
        if computed != self.id {
            return Err(TransactionError::IdMismatch {
                stored: self.id.clone(),
                computed,
            });
        }

        let signature = match &self.signature {
            Some(signature) if !signature.is_empty() => signature,
            _ => return Err(TransactionError::NotSigned),
        };

        if verifier.verify(&self.sender, &computed, signature) {
            Ok(())
        } else {
            Err(TransactionError::InvalidSignature)
        }
    }

    /// Returns true if the transaction may enter a block
    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    pub fn validate_with<V: SignatureVerifier>(&self, verifier: &V) -> bool {
        self.check_with(verifier).is_ok()
    }

    /// The fields committed to by a block hash
    pub fn payload(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "sender": self.sender.0,
            "recipient": self.recipient.0,
            "amount": self.amount,
            "timestamp": self.timestamp,
            "signature": self.signature.as_ref().map(|s| s.0.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _: &Address, _: &str, _: &DigitalSignature) -> bool {
            false
        }
    }

    fn signed(wallet: &Wallet, amount: f64) -> Transaction {
        let recipient = Wallet::new();
        let mut transaction = Transaction::new(wallet.address().clone(), recipient.address().clone(), amount);
        transaction.sign(wallet).unwrap();
        transaction
    }

    #[test]
    fn test_new_transaction() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);

        assert_eq!(transaction.sender, *sender.address());
        assert_eq!(transaction.recipient, *recipient.address());
        assert_eq!(transaction.amount, 10.5);
        assert_eq!(transaction.id, transaction.calculate_id());
        assert_eq!(transaction.id.len(), 64);
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_id_is_deterministic() {
        let first = Transaction::with_timestamp("alice".into(), "bob".into(), 10.0, 1_700_000_000_000_001);
        let second = Transaction::with_timestamp("alice".into(), "bob".into(), 10.0, 1_700_000_000_000_001);
        let later = Transaction::with_timestamp("alice".into(), "bob".into(), 10.0, 1_700_000_000_000_002);

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, later.id);
    }

    #[test]
    fn test_id_survives_reserialization() {
        let wallet = Wallet::new();
        let transaction = signed(&wallet, 0.1);

        let json = serde_json::to_string(&transaction).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.calculate_id(), transaction.id);
        assert!(decoded.validate());
    }

    #[test]
    fn test_sign_transaction() {
        let wallet = Wallet::new();
        let mut transaction = Transaction::new(wallet.address().clone(), Wallet::new().address().clone(), 10.0);
        let id_before = transaction.id.clone();

        assert!(!transaction.validate());
        transaction.sign(&wallet).unwrap();

        assert!(transaction.signature.is_some());
        assert_eq!(transaction.id, id_before);
        assert!(transaction.validate());
    }

    #[test]
    fn test_sign_with_foreign_wallet_is_refused() {
        let wallet = Wallet::new();
        let mut transaction = Transaction::new(wallet.address().clone(), "bob".into(), 10.0);

        let result = transaction.sign(&Wallet::new());
        assert!(matches!(result, Err(TransactionError::InvalidSenderAddress(_))));
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_tampered_amount_invalidates() {
        let wallet = Wallet::new();
        let mut transaction = signed(&wallet, 15.0);
        transaction.amount = 16.0;

        assert!(!transaction.validate());

        // Even with a refreshed id the signature no longer matches
        transaction.id = transaction.calculate_id();
        assert!(matches!(transaction.check(), Err(TransactionError::InvalidSignature)));
    }

    #[test]
    fn test_tampered_recipient_invalidates() {
        let wallet = Wallet::new();
        let mut transaction = signed(&wallet, 15.0);
        transaction.recipient = Wallet::new().address().clone();
        transaction.id = transaction.calculate_id();

        assert!(!transaction.validate());
    }

    #[test]
    fn test_tampered_sender_invalidates() {
        let wallet = Wallet::new();
        let mut transaction = signed(&wallet, 15.0);
        transaction.sender = Wallet::new().address().clone();
        transaction.id = transaction.calculate_id();

        assert!(matches!(transaction.check(), Err(TransactionError::InvalidSignature)));
    }

    #[test]
    fn test_tampered_timestamp_invalidates() {
        let wallet = Wallet::new();
        let mut transaction = signed(&wallet, 15.0);
        transaction.timestamp += 1;

        assert!(matches!(transaction.check(), Err(TransactionError::IdMismatch { .. })));

        transaction.id = transaction.calculate_id();
        assert!(matches!(transaction.check(), Err(TransactionError::InvalidSignature)));
    }

    #[test]
    fn test_empty_signature_is_invalid() {
        let wallet = Wallet::new();
        let mut transaction = signed(&wallet, 1.0);
        transaction.signature = Some(DigitalSignature(String::new()));

        assert!(matches!(transaction.check(), Err(TransactionError::NotSigned)));
    }

    #[test]
    fn test_non_positive_amount_is_invalid() {
        let wallet = Wallet::new();
        assert!(matches!(signed(&wallet, 0.0).check(), Err(TransactionError::InvalidAmount(_))));
        assert!(matches!(signed(&wallet, -5.0).check(), Err(TransactionError::InvalidAmount(_))));
    }

    #[test]
    fn test_coinbase_transaction() {
        let miner = Wallet::new();
        let transaction = Transaction::new_coinbase(miner.address().clone(), 50.0);

        assert_eq!(transaction.sender.0, "coinbase");
        assert_eq!(transaction.recipient, *miner.address());
        assert!(transaction.is_coinbase());
        assert!(transaction.signature.is_none());
        assert!(transaction.validate());
    }

    #[test]
    fn test_injected_verifier_is_used() {
        let wallet = Wallet::new();
        let transaction = signed(&wallet, 3.0);

        assert!(transaction.validate_with(&Ed25519Verifier));
        assert!(!transaction.validate_with(&RejectAll));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let payload = serde_json::json!({
            "id": "x", "sender": "a", "recipient": "b", "amount": 1.0,
            "timestamp": 1, "signature": null, "fee": 0.1,
        });
        assert!(serde_json::from_value::<Transaction>(payload).is_err());

        let missing = serde_json::json!({ "id": "x", "sender": "a", "amount": 1.0, "timestamp": 1, "signature": null });
        assert!(serde_json::from_value::<Transaction>(missing).is_err());
    }

    #[test]
    fn test_missing_version_defaults() {
        let payload = serde_json::json!({
            "id": "x", "sender": "a", "recipient": "b", "amount": 1.0, "timestamp": 1, "signature": null,
        });
        let transaction: Transaction = serde_json::from_value(payload).unwrap();
        assert_eq!(transaction.version, TRANSACTION_VERSION);
    }
}
