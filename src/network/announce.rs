//! # Announce Loop
//!
//! One tick of the periodic announce: retire the previous offer pool,
//! build a fresh one, wait for every pooled peer's local description,
//! sign each offer and fan the bundle out to all configured trackers.
//!
//! Socket trouble is handled inline: a closed socket gets one forced
//! reopen this tick, a still-connecting socket is skipped until the next
//! tick. The announce timer itself is the liveness mechanism; there are
//! no per-send timeouts.

use futures::future::join_all;
use tokio::sync::oneshot;

use crate::crypto::sign_sdp;
use crate::error::Result;

use super::peer::SessionDesc;
use super::pool::{clean_pool, make_offers};
use super::protocol::{AnnouncedOffer, OfferAnnounce, ACTION_ANNOUNCE};
use super::room::JoinState;
use super::socket::{FrameSink, SocketState, SOCKETS};
use super::{self_id, OFFER_POOL_SIZE};

/// Run one announce tick for a joined namespace
pub(crate) async fn announce(state: &mut JoinState) -> Result<()> {
    clean_pool(
        &mut state.pool,
        &state.handled_offers,
        &state.connected_peers,
    );
    state.handled_offers.clear();
    state.pool = make_offers(&*state.factory, state.rtc_config.as_ref(), OFFER_POOL_SIZE);

    let offers = collect_offers(state).await?;
    let frame = OfferAnnounce {
        action: ACTION_ANNOUNCE,
        info_hash: &state.info_hash,
        peer_id: self_id(),
        numwant: OFFER_POOL_SIZE,
        offers: &offers,
    };
    let payload = serde_json::to_string(&frame)?;

    for url in &state.tracker_urls {
        send_announce(url, &payload).await;
    }
    Ok(())
}

/// Wait for every pooled peer's local description and sign it
///
/// The descriptions are awaited in parallel; each resolves exactly once.
/// A pooled peer that died before producing one is skipped.
pub(crate) async fn collect_offers(state: &mut JoinState) -> Result<Vec<AnnouncedOffer>> {
    let pending: Vec<(String, oneshot::Receiver<SessionDesc>)> = state
        .pool
        .iter_mut()
        .filter_map(|(offer_id, entry)| {
            entry.local_rx.take().map(|rx| (offer_id.clone(), rx))
        })
        .collect();

    let resolved = join_all(
        pending
            .into_iter()
            .map(|(offer_id, rx)| async move { (offer_id, rx.await) }),
    )
    .await;

    let mut offers = Vec::with_capacity(resolved.len());
    for (offer_id, result) in resolved {
        let desc = match result {
            Ok(desc) => desc,
            Err(_) => {
                tracing::debug!("Pooled peer {} produced no local description", offer_id);
                continue;
            }
        };
        let envelope = sign_sdp(&state.keypair, &desc.sdp)?;
        offers.push(AnnouncedOffer {
            offer_id,
            offer: SessionDesc {
                kind: desc.kind,
                sdp: envelope,
            },
        });
    }
    Ok(offers)
}

/// Deliver one announce payload to one tracker
async fn send_announce(url: &str, payload: &str) {
    let socket = SOCKETS.socket(url).await;
    match socket.state() {
        SocketState::Open => {
            if let Err(e) = socket.send_frame(payload.to_string()) {
                tracing::warn!("Announce to {} failed: {}", url, e);
            }
        }
        SocketState::Closed => {
            // Stale socket: force one fresh connection this tick
            let socket = SOCKETS.force_reopen(url).await;
            if socket.state() == SocketState::Open {
                if let Err(e) = socket.send_frame(payload.to_string()) {
                    tracing::warn!("Announce to {} failed after reopen: {}", url, e);
                }
            } else {
                tracing::warn!("Tracker {} unreachable this tick", url);
            }
        }
        // Still connecting: skip this tick, the next one retries
        SocketState::Connecting => {}
    }
}

// ============================================================================
// TESTS
// ============================================================================
