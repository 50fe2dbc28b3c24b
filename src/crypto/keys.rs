//! # Key Management
//!
//! ECDSA P-384 keypairs used to sign session descriptions during the
//! signaling handshake, and JWK interchange for the public half.
//!
//! The keypair is provisioned per join and lives exactly as long as the
//! join. The public key travels inside every signed-SDP envelope as a JWK
//! object, so the counterparty can verify without any prior key exchange.

use p384::ecdsa::{SigningKey, VerifyingKey};
use p384::PublicKey;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// ECDSA P-384 signing keypair
pub struct SigningKeyPair {
    /// Private signing key (secret, zeroized on drop by `p384`)
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::random(&mut OsRng);
        Self { secret }
    }

    /// Create from raw secret scalar bytes (48 bytes for P-384)
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SigningKey::from_slice(bytes)
            .map_err(|e| Error::InvalidKey(format!("Invalid P-384 secret key: {}", e)))?;
        Ok(Self { secret })
    }

    /// Get the secret scalar bytes (for backup/storage)
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> Vec<u8> {
        self.secret.to_bytes().to_vec()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key().clone()
    }

    /// Export the public key as a JWK object
    ///
    /// This is the exact value embedded in the `key` field of a signed-SDP
    /// envelope.
    pub fn public_jwk(&self) -> Result<serde_json::Value> {
        let public = PublicKey::from(self.verifying_key());
        serde_json::from_str(&public.to_jwk_string())
            .map_err(|e| Error::SigningFailed(format!("JWK export failed: {}", e)))
    }

    /// Get reference to the signing key
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// Import a verify-capable P-384 key from a JWK object
///
/// Returns `InvalidKey` if the JWK is not a valid P-384 public key.
pub fn verifying_key_from_jwk(jwk: &serde_json::Value) -> Result<VerifyingKey> {
    let public = PublicKey::from_jwk_str(&jwk.to_string())
        .map_err(|e| Error::InvalidKey(format!("Invalid JWK: {}", e)))?;
    Ok(VerifyingKey::from(public))
}

// ============================================================================
// TESTS
// ============================================================================
