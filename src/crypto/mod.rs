//! # Cryptography Module
//!
//! Two independent cryptographic concerns back the signaling core:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SDP AUTHENTICATION (asymmetric)                            │
//! │  ───────────────────────────────                            │
//! │  ECDSA P-384 / SHA-384 over the session description text.   │
//! │  The signer's public key rides in the envelope as a JWK;    │
//! │  verification binds the SDP to that key before the peer     │
//! │  channel opens.                                             │
//! │                                                             │
//! │  ROOM-PASSWORD ENCRYPTION (symmetric)                       │
//! │  ────────────────────────────────────                       │
//! │  AES-256-CBC keyed by SHA-256("<password>:<namespace>").    │
//! │  Used by the room layer, not by the signaling core itself.  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod encryption;
pub mod keys;
pub mod signing;

pub use encryption::{decrypt, derive_room_key, encrypt, RoomKey};
pub use keys::{verifying_key_from_jwk, SigningKeyPair};
pub use signing::{sign_sdp, verify_sdp, VerifiedSdp};

/// Re-export of the P-384 verifying key pinned to peers on verification
pub use p384::ecdsa::VerifyingKey;
