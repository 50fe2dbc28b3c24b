//! # Network Module
//!
//! Peer discovery and signaling over BitTorrent-style WebSocket trackers.
//!
//! ## Signaling Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        SIGNALING FLOW                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  join_room(config, ns)                                             │
//! │       │                                                             │
//! │       ├─► info_hash("murmur:<appId>:<ns>")     swarm identity       │
//! │       ├─► offer pool: 10 initiator peers, pre-signed local offers  │
//! │       ├─► listener per tracker URL on the shared socket registry   │
//! │       └─► room event loop (one task per namespace)                 │
//! │                                                                     │
//! │  every announce tick:                                              │
//! │       clean pool ─► rebuild pool ─► sign offers ─► announce to     │
//! │       every tracker (force-reopening stale sockets)                │
//! │                                                                     │
//! │  inbound offer:   verify signature ─► responder peer ─► signed     │
//! │                   answer back on the same socket                   │
//! │  inbound answer:  verify signature ─► signal into the pooled peer  │
//! │                                                                     │
//! │  peer connect:    de-dup by peer id ─► on_peer_join callback       │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Duplicate delivery is the normal case, not the exception: the same
//! offer reaches us through every tracker we share with the counterparty.
//! The handled-offer and connected-peer sets make the handshake
//! idempotent across that redundancy.

mod announce;
pub mod peer;
pub mod protocol;
mod pool;
mod room;
mod signaling;
mod socket;

pub use peer::{
    EventHandler, Peer, PeerConnection, PeerEvent, PeerEventKind, PeerFactory, SessionDesc,
};
pub use protocol::{gen_id, info_hash};
pub use room::{join_room, Room};

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result};

/// Number of pre-initialized offers advertised per announce
pub const OFFER_POOL_SIZE: usize = 10;

/// Initial announce period, in seconds
pub const DEFAULT_ANNOUNCE_SECS: u64 = 33;

/// Upper bound a tracker's interval hint can push the announce period to
pub const MAX_ANNOUNCE_SECS: u64 = 120;

/// How many default trackers are used when none are configured
pub const DEFAULT_TRACKER_REDUNDANCY: usize = 2;

/// Well-known public WebTorrent trackers used when none are configured
pub const DEFAULT_TRACKER_URLS: [&str; 4] = [
    "wss://tracker.openwebtorrent.com",
    "wss://tracker.btorrent.xyz",
    "wss://tracker.files.fm:7073/announce",
    "wss://tracker.fastcast.nz",
];

static SELF_ID: Lazy<String> = Lazy::new(protocol::gen_id);

/// This process's participant id
///
/// Random, 20 base-36 characters, stable for the lifetime of the process.
pub fn self_id() -> &'static str {
    &SELF_ID
}

/// Configuration for joining a namespace
#[derive(Clone)]
pub struct RoomConfig {
    /// Application identifier; partitions swarms between applications
    pub app_id: String,
    /// Shared room password, consumed by the room layer's encryption
    /// (the signaling core itself never reads it)
    pub password: Option<String>,
    /// Tracker URLs to announce to; defaults apply when `None`
    pub tracker_urls: Option<Vec<String>>,
    /// How many default trackers to use when `tracker_urls` is `None`
    pub tracker_redundancy: Option<usize>,
    /// Opaque RTC configuration forwarded to the peer factory
    pub rtc_config: Option<serde_json::Value>,
    /// ECDSA P-384 keypair signing this join's session descriptions
    pub signing_keypair: Arc<SigningKeyPair>,
    /// Factory over the external WebRTC peer-connection primitive
    pub peer_factory: Arc<dyn PeerFactory>,
}

impl RoomConfig {
    /// Build a config with the required fields and defaults for the rest
    pub fn new(
        app_id: impl Into<String>,
        signing_keypair: Arc<SigningKeyPair>,
        peer_factory: Arc<dyn PeerFactory>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            password: None,
            tracker_urls: None,
            tracker_redundancy: None,
            rtc_config: None,
            signing_keypair,
            peer_factory,
        }
    }
}

/// Resolve the tracker list a join will announce to
///
/// A configured list is used as-is; otherwise the well-known defaults are
/// trimmed to the redundancy setting. An empty outcome is fatal.
pub(crate) fn resolve_tracker_urls(config: &RoomConfig) -> Result<Vec<String>> {
    let urls: Vec<String> = match &config.tracker_urls {
        Some(urls) => urls.clone(),
        None => {
            let redundancy = config
                .tracker_redundancy
                .unwrap_or(DEFAULT_TRACKER_REDUNDANCY)
                .min(DEFAULT_TRACKER_URLS.len());
            DEFAULT_TRACKER_URLS[..redundancy]
                .iter()
                .map(|url| url.to_string())
                .collect()
        }
    };

    if urls.is_empty() {
        return Err(Error::EmptyTrackers);
    }
    Ok(urls)
}

// ============================================================================
// TESTS
// ============================================================================
