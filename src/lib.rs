//! # Murmur Core
//!
//! Serverless browser-to-browser mesh networking: peer discovery and
//! authenticated WebRTC signaling over a pool of BitTorrent-style
//! WebSocket trackers, with no coordination server of its own.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        MURMUR CORE MODULES                          │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌──────────────────┐        ┌───────────────────────────────────┐  │
//! │  │     Crypto       │        │             Network               │  │
//! │  │                  │        │                                   │  │
//! │  │ - ECDSA P-384    │◄───────│ - join controller (per namespace) │  │
//! │  │   signed SDPs    │        │ - announce loop + offer pool      │  │
//! │  │ - JWK interchange│        │ - signaling handler               │  │
//! │  │ - AES-CBC room   │        │ - shared tracker sockets          │  │
//! │  │   password layer │        │ - peer surface (external WebRTC)  │  │
//! │  └──────────────────┘        └───────────────────────────────────┘  │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## How a Connection Happens
//!
//! ```text
//! 1. join_room hashes (app id, namespace) into a swarm key and starts
//!    announcing a pool of ten pre-signed WebRTC offers to every tracker.
//! 2. Another participant announcing the same swarm key receives one of
//!    those offers, verifies its ECDSA signature, and answers with its
//!    own signed description through the tracker.
//! 3. The answer is verified and signaled into the pooled peer; once the
//!    channel connects, the peer is handed to the application with the
//!    counterparty's verified key pinned.
//! ```
//!
//! Trackers are treated as unreliable and interchangeable: the same offer
//! may arrive through several of them, and the handshake is idempotent
//! against that redundancy.
//!
//! ## Security Model
//!
//! Session descriptions are signed with an ECDSA P-384 key and verified
//! before a peer is ever signaled, so a connected peer is cryptographically
//! bound to a key even though trackers are untrusted. The embedded key is
//! self-provided: the handshake proves *some* keyholder authored the SDP,
//! and pinning keys to long-lived identities is left to the layer above.
//! Room payload confidentiality (the password layer) is likewise the room
//! layer's concern; this crate only supplies the primitives.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod crypto;
pub mod error;
pub mod network;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use crypto::{
    decrypt, derive_room_key, encrypt, sign_sdp, verify_sdp, RoomKey, SigningKeyPair, VerifiedSdp,
    VerifyingKey,
};
pub use error::{Error, Result};
pub use network::{
    info_hash, join_room, self_id, EventHandler, Peer, PeerConnection, PeerEvent, PeerEventKind,
    PeerFactory, Room, RoomConfig, SessionDesc, DEFAULT_TRACKER_URLS,
};
