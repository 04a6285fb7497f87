use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

/// Sender used by mining reward transactions
pub const COINBASE_SENDER: &str = "coinbase";

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(#[from] hex::FromHexError),
}

/// Represents an account address (the hex-encoded public key itself)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates an address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(hex::encode(public_key.as_bytes()))
    }

    /// The sentinel sender of reward transactions
    pub fn coinbase() -> Self {
        Address(COINBASE_SENDER.to_string())
    }

    pub fn is_coinbase(&self) -> bool {
        self.0 == COINBASE_SENDER
    }

    /// Converts the address back into the public key it encodes
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = hex::decode(&self.0)?;

        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        VerifyingKey::from_bytes(&key_bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Represents a hex-encoded digital signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(hex::encode(signature.to_bytes()))
    }

    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = hex::decode(&self.0)?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Holds a signing key for the duration of its use
///
/// Key material never lives in global state: a wallet is built from a fresh
/// keypair or an explicit secret and handed to whatever needs to sign.
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Creates a wallet from a hex-encoded 32 byte secret key
    pub fn from_secret_hex(secret_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_key)?;

        let bytes_array: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key());
        Wallet { signing_key, address }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Exports the secret key as hex
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Signs a hex-encoded payload hash
    ///
    /// The message is the raw digest bytes, not the hex text.
    pub fn sign(&self, payload_hash: &str) -> Result<DigitalSignature, CryptoError> {
        let message = hex::decode(payload_hash)?;
        let signature = self.signing_key.sign(&message);
        Ok(DigitalSignature::from_signature(&signature))
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a fresh keypair
///
/// # Returns
///
/// `(private_key_hex, public_key_hex)`
pub fn generate_key_pair() -> (String, String) {
    let wallet = Wallet::new();
    (wallet.secret_hex(), wallet.address.0)
}

/// Signs a payload hash with a hex-encoded private key
pub fn sign(private_key: &str, payload_hash: &str) -> Result<DigitalSignature, CryptoError> {
    Wallet::from_secret_hex(private_key)?.sign(payload_hash)
}

/// Verifies a signature over a payload hash
///
/// Returns false on any decoding defect.
pub fn verify(public_key: &Address, payload_hash: &str, signature: &DigitalSignature) -> bool {
    try_verify(public_key, payload_hash, signature).unwrap_or(false)
}

fn try_verify(
    public_key: &Address,
    payload_hash: &str,
    signature: &DigitalSignature,
) -> Result<bool, CryptoError> {
    let public_key = public_key.to_public_key()?;
    let signature = signature.to_signature()?;
    let message = hex::decode(payload_hash)?;

    Ok(public_key.verify(&message, &signature).is_ok())
}

/// Capability used by transaction validation to check signatures
pub trait SignatureVerifier {
    fn verify(&self, public_key: &Address, payload_hash: &str, signature: &DigitalSignature) -> bool;
}

/// Verifies Ed25519 signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &Address, payload_hash: &str, signature: &DigitalSignature) -> bool {
        verify(public_key, payload_hash, signature)
    }
}
