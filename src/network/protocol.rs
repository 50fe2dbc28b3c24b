//! # Tracker Wire Protocol
//!
//! JSON over WebSocket text frames, compatible with WebTorrent-style
//! trackers. A swarm is keyed by a 20-character base-36 info hash derived
//! from the application id and namespace, so two participants configured
//! identically land in the same swarm without coordination.
//!
//! ## Frames
//!
//! ```text
//! ── Outbound ──────────────────────────────────────────────────
//! announce   { action, info_hash, peer_id, numwant, offers[] }
//! answer     { action, info_hash, peer_id, to_peer_id,
//!              offer_id, answer }
//!
//! ── Inbound (shapes recognized) ───────────────────────────────
//! offer      { info_hash, peer_id, offer, offer_id }
//! answer     { info_hash, peer_id, answer, offer_id }
//! interval   { info_hash, interval }
//! failure    { "failure reason": <text> }
//! ```
//!
//! Inbound frames are parsed loosely: every field is optional and the
//! handler decides which shape it is looking at.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::peer::SessionDesc;
use super::MAX_ANNOUNCE_SECS;

/// Library name mixed into every swarm key
///
/// Keeps Murmur swarms disjoint from other applications announcing the
/// same namespace strings to the same trackers.
pub(crate) const LIB_NAME: &str = "murmur";

/// Length of ids and info hashes in characters
pub(crate) const HASH_LIMIT: usize = 20;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derive the swarm key for `(app_id, ns)`
///
/// The first [`HASH_LIMIT`] characters of the base-36 rendering of
/// SHA-1 over `"murmur:<app_id>:<ns>"`. Deterministic: independent
/// processes with identical inputs compute identical swarm keys.
pub fn info_hash(app_id: &str, ns: &str) -> String {
    let digest = Sha1::digest(format!("{}:{}:{}", LIB_NAME, app_id, ns).as_bytes());
    let mut out = String::with_capacity(HASH_LIMIT * 2);
    for byte in digest {
        // Big-endian base-36 of each byte; 255 < 36^2 so two digits max.
        if byte >= 36 {
            out.push(BASE36[(byte / 36) as usize] as char);
        }
        out.push(BASE36[(byte % 36) as usize] as char);
    }
    out.truncate(HASH_LIMIT);
    out
}

/// Generate a fresh random 20-character base-36 token
///
/// Used for the process-wide self id and for per-announce offer ids.
pub fn gen_id() -> String {
    let mut rng = rand::thread_rng();
    (0..HASH_LIMIT)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

// ============================================================================
// OUTBOUND FRAMES
// ============================================================================

/// One pooled offer as it appears inside an announce frame
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnnouncedOffer {
    pub offer_id: String,
    /// The local description with its SDP replaced by a signed envelope
    pub offer: SessionDesc,
}

/// Periodic announce carrying the whole offer pool
#[derive(Debug, Serialize)]
pub(crate) struct OfferAnnounce<'a> {
    pub action: &'static str,
    pub info_hash: &'a str,
    pub peer_id: &'a str,
    pub numwant: usize,
    pub offers: &'a [AnnouncedOffer],
}

/// Directed answer to one remote offer
#[derive(Debug, Serialize)]
pub(crate) struct AnswerAnnounce<'a> {
    pub action: &'static str,
    pub info_hash: &'a str,
    pub peer_id: &'a str,
    pub to_peer_id: &'a str,
    pub offer_id: &'a str,
    /// The local answer with its SDP replaced by a signed envelope
    pub answer: SessionDesc,
}

/// The announce action tag shared by both outbound frames
pub(crate) const ACTION_ANNOUNCE: &str = "announce";

// ============================================================================
// INBOUND FRAMES
// ============================================================================

/// Loosely parsed inbound tracker frame
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TrackerFrame {
    pub info_hash: Option<String>,
    pub peer_id: Option<String>,
    pub offer_id: Option<String>,
    pub offer: Option<SessionDesc>,
    pub answer: Option<SessionDesc>,
    /// Announce-interval hint, in seconds
    pub interval: Option<u64>,
    #[serde(rename = "failure reason")]
    pub failure_reason: Option<String>,
}

/// Apply a tracker's interval hint to the current announce period
///
/// Trackers may only slow the loop down: the hint is taken when it exceeds
/// the current period and stays within [`MAX_ANNOUNCE_SECS`]. Anything
/// else is ignored.
pub(crate) fn adapted_interval(current_secs: u64, hint_secs: u64) -> Option<u64> {
    (hint_secs > current_secs && hint_secs <= MAX_ANNOUNCE_SECS).then_some(hint_secs)
}

// ============================================================================
// TESTS
// ============================================================================
