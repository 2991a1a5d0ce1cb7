//! Node identity: the long-term ed25519 key pair and the address scheme.
//!
//! The externally visible address of a node is a deterministic digest of its
//! public key: the first 20 bytes of SHA-256 over the raw key, hex-encoded.
//! Verification failures are ordinary outcomes and surface as `false`;
//! only missing or corrupt local key material is fatal, and only at startup.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// Width of a raw ed25519 public key
pub const PUBLIC_KEY_WIDTH: usize = 32;

/// Width of a raw ed25519 signature
pub const SIGNATURE_WIDTH: usize = 64;

/// Width of the address digest kept from the SHA-256 hash
const ADDRESS_WIDTH: usize = 20;

/// Failures loading or persisting the node's own key material.
///
/// Any of these at startup must prevent the node from accepting connections.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to access key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file does not contain a valid hex-encoded ed25519 seed")]
    InvalidSeed,
}

/// The node's long-term key pair. Created or loaded once at startup and
/// immutable for the lifetime of the process; safe to share across tasks.
#[derive(Clone)]
pub struct NodeIdentity {
    signing_key: SigningKey,
}

impl NodeIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct an identity from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Load an identity from a hex-encoded seed file.
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let text = std::fs::read_to_string(path)?;
        let raw = hex::decode(text.trim()).map_err(|_| KeyError::InvalidSeed)?;
        let seed: [u8; 32] = raw.try_into().map_err(|_| KeyError::InvalidSeed)?;
        Ok(Self::from_seed(seed))
    }

    /// Persist the seed as hex so [`NodeIdentity::load`] can restore it.
    pub fn save(&self, path: &Path) -> Result<(), KeyError> {
        std::fs::write(path, hex::encode(self.signing_key.to_bytes()))?;
        Ok(())
    }

    /// Raw public key bytes, as carried in handshake payloads.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_WIDTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// This node's network-visible identity.
    pub fn peer_id(&self) -> String {
        address_of(&self.public_key_bytes())
    }

    /// Sign a message with the node's private key. Ed25519 signing is
    /// deterministic, so repeated calls over the same bytes agree.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_WIDTH] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id())
            .finish()
    }
}

/// Verify `signature` over `message` against a claimed public key.
///
/// Returns `false` for malformed keys or signatures rather than erroring;
/// a peer handing us garbage is an expected event, not an exceptional one.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let key = match <[u8; PUBLIC_KEY_WIDTH]>::try_from(public_key)
        .ok()
        .and_then(|bytes| VerifyingKey::from_bytes(&bytes).ok())
    {
        Some(key) => key,
        None => return false,
    };

    let signature = match <[u8; SIGNATURE_WIDTH]>::try_from(signature) {
        Ok(bytes) => Signature::from_bytes(&bytes),
        Err(_) => return false,
    };

    key.verify(message, &signature).is_ok()
}

/// Derive the network address of a public key: hex of the first 20 bytes of
/// SHA-256 over the raw key. Pure and deterministic.
pub fn address_of(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..ADDRESS_WIDTH])
}
