//! # Signed Session Descriptions
//!
//! Binds a WebRTC session description to an ECDSA P-384 key before the
//! data channel ever opens. The SDP travels through untrusted trackers, so
//! it is wrapped in a signed envelope and checked out-of-band on arrival.
//!
//! ## Envelope Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SENDER                                                     │
//! │                                                             │
//! │  sdp ──► ECDSA-P384/SHA-384 sign ──► signature (r||s)       │
//! │                                                             │
//! │  { "sdp": <sdp text>,                                       │
//! │    "signature": base64(r||s),                               │
//! │    "key": <signer's public JWK> }  ──► tracker              │
//! └─────────────────────────────────────────────────────────────┘
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RECEIVER                                                   │
//! │                                                             │
//! │  parse envelope ──► import JWK ──► verify signature         │
//! │        │                │                │                  │
//! │   BadEnvelope      InvalidKey     verified: true/false      │
//! │                                                             │
//! │  verified == true  ──► pin key to the peer, signal the sdp  │
//! │  verified == false ──► warn and drop the frame              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The verifier trusts the key embedded in the envelope: it proves the SDP
//! was signed by *some* keyholder, not by a pre-known identity. Pinning a
//! key to a long-lived identity is a higher-layer concern.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p384::ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::crypto::keys::{verifying_key_from_jwk, SigningKeyPair};
use crate::error::{Error, Result};

/// Wire form of a signed session description
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignedSdp {
    /// The original SDP text
    sdp: String,
    /// Base64 of the raw `r||s` ECDSA signature over UTF-8 of `sdp`
    signature: String,
    /// The signer's public key as a JWK object
    key: serde_json::Value,
}

/// Outcome of verifying a signed-SDP envelope
#[derive(Debug, Clone)]
pub struct VerifiedSdp {
    /// The SDP text carried by the envelope
    pub sdp: String,
    /// Whether the signature checked out against the embedded key
    pub verified: bool,
    /// The imported key, so the caller may pin it to the peer
    pub key: VerifyingKey,
}

/// Sign an SDP, producing the JSON envelope string placed on the wire
///
/// The signature is ECDSA P-384 over SHA-384 of the UTF-8 SDP text, and
/// the signer's public key rides along as a JWK.
pub fn sign_sdp(keypair: &SigningKeyPair, sdp: &str) -> Result<String> {
    let signature: Signature = keypair.signing_key().sign(sdp.as_bytes());
    let envelope = SignedSdp {
        sdp: sdp.to_string(),
        signature: BASE64.encode(signature.to_bytes()),
        key: keypair.public_jwk()?,
    };
    serde_json::to_string(&envelope).map_err(|e| Error::SigningFailed(e.to_string()))
}

/// Parse and verify a signed-SDP envelope
///
/// Returns `BadEnvelope` when the envelope or signature bytes cannot be
/// parsed and `InvalidKey` when the embedded JWK is unusable. A signature
/// that parses but does not check out yields `verified == false` rather
/// than an error; the caller decides to drop the frame.
pub fn verify_sdp(envelope: &str) -> Result<VerifiedSdp> {
    let envelope: SignedSdp =
        serde_json::from_str(envelope).map_err(|e| Error::BadEnvelope(e.to_string()))?;

    let key = verifying_key_from_jwk(&envelope.key)?;

    let signature_bytes = BASE64
        .decode(&envelope.signature)
        .map_err(|e| Error::BadEnvelope(format!("Signature not base64: {}", e)))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| Error::BadEnvelope(format!("Malformed signature: {}", e)))?;

    let verified = key.verify(envelope.sdp.as_bytes(), &signature).is_ok();

    Ok(VerifiedSdp {
        sdp: envelope.sdp,
        verified,
        key,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SDP: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n";

    #[test]
    fn test_sign_verify_roundtrip() {
        let keypair = SigningKeyPair::generate();
        let envelope = sign_sdp(&keypair, SDP).unwrap();

        let result = verify_sdp(&envelope).unwrap();
        assert!(result.verified);
        assert_eq!(result.sdp, SDP);
        assert_eq!(result.key, keypair.verifying_key());
    }

    #[test]
    fn test_tampered_sdp_fails() {
        let keypair = SigningKeyPair::generate();
        let envelope = sign_sdp(&keypair, SDP).unwrap();

        let mut parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        parsed["sdp"] = serde_json::Value::String(format!("{}a=tampered\r\n", SDP));
        let result = verify_sdp(&parsed.to_string()).unwrap();
        assert!(!result.verified);
    }

    #[test]
    fn test_tampered_signature_fails() {
        let keypair = SigningKeyPair::generate();
        let envelope = sign_sdp(&keypair, SDP).unwrap();

        let mut parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        let signature = parsed["signature"].as_str().unwrap();
        let mut bytes = BASE64.decode(signature).unwrap();
        bytes[0] ^= 0x01;
        parsed["signature"] = serde_json::Value::String(BASE64.encode(&bytes));

        let result = verify_sdp(&parsed.to_string()).unwrap();
        assert!(!result.verified);
    }

    #[test]
    fn test_foreign_key_fails() {
        // Envelope signed by one key but carrying another key's JWK
        let signer = SigningKeyPair::generate();
        let imposter = SigningKeyPair::generate();

        let envelope = sign_sdp(&signer, SDP).unwrap();
        let mut parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        parsed["key"] = imposter.public_jwk().unwrap();

        let result = verify_sdp(&parsed.to_string()).unwrap();
        assert!(!result.verified);
    }

    #[test]
    fn test_garbage_envelope_rejected() {
        assert!(matches!(verify_sdp("not json"), Err(Error::BadEnvelope(_))));
        assert!(matches!(
            verify_sdp(r#"{"sdp": "x"}"#),
            Err(Error::BadEnvelope(_))
        ));
    }

    #[test]
    fn test_bad_signature_encoding_rejected() {
        let keypair = SigningKeyPair::generate();
        let envelope = sign_sdp(&keypair, SDP).unwrap();

        let mut parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        parsed["signature"] = serde_json::Value::String("***".into());
        assert!(matches!(
            verify_sdp(&parsed.to_string()),
            Err(Error::BadEnvelope(_))
        ));
    }
}
