//! # Offer Pool
//!
//! A bank of pre-initialized initiator peers, one per pooled offer, so an
//! announce can advertise ten ready-to-sign offers and answer a tracker's
//! batched peer list in a single round trip.
//!
//! The pool is rebuilt on every announce tick. An entry leaves the pool in
//! exactly one of three ways: its answer arrived (handled downstream), its
//! peer connected (transferred out to the room), or [`clean_pool`]
//! destroys it. Leaked peers are therefore impossible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::peer::{Peer, PeerEvent, PeerEventKind, PeerFactory, SessionDesc};
use super::protocol::gen_id;

/// One pooled offer: an initiator peer plus its pending local description
pub(crate) struct PoolEntry {
    /// The initiator-mode connection, wrapped with its key slot
    pub peer: Arc<Peer>,
    /// Resolves with the peer's first `Signal` event, exactly once
    pub local_rx: Option<oneshot::Receiver<SessionDesc>>,
}

/// Offer id → pooled entry
pub(crate) type OfferPool = HashMap<String, PoolEntry>;

/// Build a fresh pool of `size` initiator peers
///
/// Each entry gets a fresh random offer id and a oneshot that its peer's
/// first local description resolves.
pub(crate) fn make_offers(
    factory: &dyn PeerFactory,
    rtc_config: Option<&serde_json::Value>,
    size: usize,
) -> OfferPool {
    let mut pool = OfferPool::with_capacity(size);
    for _ in 0..size {
        let conn = factory.create(true, rtc_config);
        let peer = Peer::new(conn.clone());

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        conn.once(
            PeerEventKind::Signal,
            Box::new(move |event| {
                if let (PeerEvent::Signal(desc), Some(tx)) = (event, tx.take()) {
                    let _ = tx.send(desc);
                }
            }),
        );

        pool.insert(
            gen_id(),
            PoolEntry {
                peer,
                local_rx: Some(rx),
            },
        );
    }
    pool
}

/// Destroy every entry that was neither handled nor connected
///
/// Leaves the pool empty; the caller rebuilds it right after.
pub(crate) fn clean_pool(
    pool: &mut OfferPool,
    handled_offers: &HashSet<String>,
    connected_peers: &HashSet<String>,
) {
    for (offer_id, entry) in pool.drain() {
        if !handled_offers.contains(&offer_id) && !connected_peers.contains(&offer_id) {
            entry.peer.destroy();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
