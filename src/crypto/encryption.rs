//! # Room-Password Encryption
//!
//! AES-256-CBC encryption keyed from a shared room password. The signaling
//! core does not use this itself; it is provided for the room layer, which
//! encrypts payloads so trackers and uninvited peers see only ciphertext.
//!
//! The key is a single SHA-256 digest over `"<password>:<namespace>"`, so
//! any two participants who know the password derive the same key without
//! an exchange. Each call to [`encrypt`] draws a fresh random IV.
//!
//! ## Envelope
//!
//! ```text
//! { "c": base64(AES-256-CBC ciphertext, PKCS#7 padded),
//!   "iv": [16 bytes] }
//! ```

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;

/// Size of the derived room key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A symmetric key shared by everyone who knows the room password
#[derive(Clone)]
pub struct RoomKey([u8; KEY_SIZE]);

impl RoomKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Wire form of an encrypted payload
#[derive(Debug, Serialize, Deserialize)]
struct Sealed {
    /// Base64 ciphertext
    c: String,
    /// Per-message initialization vector
    iv: [u8; IV_SIZE],
}

/// Derive the room key from the shared password and namespace
///
/// SHA-256 over `"<password>:<namespace>"`. Deterministic, so independent
/// participants converge on the same key.
pub fn derive_room_key(password: &str, ns: &str) -> RoomKey {
    let digest = Sha256::digest(format!("{}:{}", password, ns).as_bytes());
    RoomKey(digest.into())
}

/// Encrypt a payload under the room key
///
/// Produces the JSON envelope `{c, iv}` with a fresh random IV.
pub fn encrypt(key: &RoomKey, plaintext: &str) -> Result<String> {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(&key.0, &iv)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    serde_json::to_string(&Sealed {
        c: BASE64.encode(ciphertext),
        iv,
    })
    .map_err(|e| Error::EncryptionFailed(e.to_string()))
}

/// Decrypt an envelope produced by [`encrypt`]
///
/// Fails with `DecryptionFailed` when the envelope is malformed, the key
/// is wrong, or the padding does not check out.
pub fn decrypt(key: &RoomKey, envelope: &str) -> Result<String> {
    let sealed: Sealed =
        serde_json::from_str(envelope).map_err(|e| Error::DecryptionFailed(e.to_string()))?;
    let ciphertext = BASE64
        .decode(&sealed.c)
        .map_err(|e| Error::DecryptionFailed(e.to_string()))?;

    let cipher = Aes256CbcDec::new_from_slices(&key.0, &sealed.iv)
        .map_err(|e| Error::DecryptionFailed(e.to_string()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::DecryptionFailed("Bad ciphertext or key".into()))?;

    String::from_utf8(plaintext).map_err(|e| Error::DecryptionFailed(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_room_key("hunter2", "lobby");
        let envelope = encrypt(&key, "open sesame").unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), "open sesame");
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let a = derive_room_key("pw", "room");
        let b = derive_room_key("pw", "room");
        let envelope = encrypt(&a, "payload").unwrap();
        assert_eq!(decrypt(&b, &envelope).unwrap(), "payload");
    }

    #[test]
    fn test_wrong_password_fails() {
        let key = derive_room_key("right", "room");
        let wrong = derive_room_key("wrong", "room");
        let envelope = encrypt(&key, "secret").unwrap();
        // Wrong key either unpads garbage or fails outright; it never
        // yields the plaintext.
        match decrypt(&wrong, &envelope) {
            Ok(plaintext) => assert_ne!(plaintext, "secret"),
            Err(e) => assert!(matches!(e, Error::DecryptionFailed(_))),
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = derive_room_key("pw", "room");
        let a = encrypt(&key, "same message").unwrap();
        let b = encrypt(&key, "same message").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = derive_room_key("pw", "room");
        let envelope = encrypt(&key, "").unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), "");
    }

    #[test]
    fn test_garbage_envelope_rejected() {
        let key = derive_room_key("pw", "room");
        assert!(decrypt(&key, "not json").is_err());
        assert!(decrypt(&key, r#"{"c": "***", "iv": [0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0]}"#).is_err());
    }
}
