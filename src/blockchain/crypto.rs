use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

/// Width of a block digest in bytes
pub const HASH_SIZE: usize = 32;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Represents a wallet address (public key in base58 format)
///
/// Arbitrary strings are accepted as recipients; only senders must decode to
/// a verifying key.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let bytes = public_key.as_bytes();
        Address(bs58::encode(bytes).into_string())
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

/// Represents a digital signature (base58 encoded)
///
/// Reward transactions carry the empty signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// Canonical byte encoding of a payload, shared by signing and hashing
///
/// Map-typed payloads must use ordered maps so the encoding is stable.
pub fn canonical_bytes<T: Serialize + ?Sized>(payload: &T) -> Vec<u8> {
    serde_json::to_vec(payload).expect("ledger payloads always serialize to JSON")
}

/// SHA-256 over the canonical encoding of `payload`
pub fn crypto_hash<T: Serialize + ?Sized>(payload: &T) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(payload));
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest[..]);
    out
}

/// Number of leading zero bits in the binary expansion of `hash`
pub fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut total = 0u32;
    for byte in hash {
        if *byte == 0 {
            total += 8;
        } else {
            total += byte.leading_zeros();
            break;
        }
    }
    total
}

/// Verifies `signature` over the canonical encoding of `payload` against the
/// key encoded in `address`
///
/// Returns `Ok(false)` for a well-formed signature that does not match and an
/// error when the address or signature cannot be decoded.
pub fn verify_signature<T: Serialize + ?Sized>(
    address: &Address,
    payload: &T,
    signature: &DigitalSignature,
) -> Result<bool, CryptoError> {
    let public_key = address.to_public_key()?;
    let signature = signature.to_signature()?;

    Ok(public_key
        .verify(&canonical_bytes(payload), &signature)
        .is_ok())
}
