//! # Join Controller
//!
//! One controller per joined namespace. `join_room` validates the config,
//! claims the namespace, subscribes to every tracker socket and spawns the
//! room event loop; the returned [`Room`] handle installs the peer-join
//! callback and tears the join down again.
//!
//! ## Event Loop
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  room task (one per namespace)                              │
//! │                                                             │
//! │  tokio::select! {                                           │
//! │    announce timer   → rebuild pool, announce to trackers    │
//! │    tracker frame    → signaling handler (offer/answer/...)  │
//! │    peer event       → sign answers, connect bookkeeping     │
//! │    command          → set callback / leave                  │
//! │  }                                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop owns all mutable join state, so de-duplication flags are only
//! ever touched from one task and check-then-mutate sequences cannot
//! interleave.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::crypto::{sign_sdp, SigningKeyPair};
use crate::error::{Error, Result};

use super::peer::{Peer, PeerFactory, SessionDesc};
use super::pool::{clean_pool, OfferPool};
use super::protocol::{info_hash, AnswerAnnounce, ACTION_ANNOUNCE};
use super::signaling;
use super::socket::{FrameSink, SOCKETS};
use super::{announce, resolve_tracker_urls, self_id, RoomConfig, DEFAULT_ANNOUNCE_SECS};

/// Namespaces currently joined in this process
static OCCUPIED_ROOMS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Callback receiving verified, connected peers
pub(crate) type PeerJoinCallback = Arc<dyn Fn(Arc<Peer>, String) + Send + Sync>;

/// Events flowing from peer callbacks back into the room task
pub(crate) enum RoomEvent {
    /// A responder peer produced its local answer
    LocalAnswer {
        /// Socket the triggering offer arrived on
        sink: Arc<dyn FrameSink>,
        to_peer_id: String,
        offer_id: String,
        desc: SessionDesc,
    },
    /// A peer channel reached the connected state
    Connected {
        peer: Arc<Peer>,
        peer_id: String,
        /// Set for pooled peers, so the consumed offer id is also marked
        offer_id: Option<String>,
    },
    /// A peer channel closed
    Closed { peer_id: String },
}

enum RoomCommand {
    SetCallback(PeerJoinCallback),
    Leave(oneshot::Sender<()>),
}

/// All mutable state of one joined namespace
pub(crate) struct JoinState {
    pub ns: String,
    pub info_hash: String,
    pub tracker_urls: Vec<String>,
    pub keypair: Arc<SigningKeyPair>,
    pub factory: Arc<dyn PeerFactory>,
    pub rtc_config: Option<serde_json::Value>,
    /// Current announce period; grows with tracker hints, never shrinks
    pub announce_secs: u64,
    pub pool: OfferPool,
    /// Offer ids consumed this announce cycle
    pub handled_offers: HashSet<String>,
    /// Peer ids (and consumed offer ids) with a live channel
    pub connected_peers: HashSet<String>,
    pub on_peer: PeerJoinCallback,
    pub events_tx: mpsc::UnboundedSender<RoomEvent>,
}

/// Handle to a joined namespace
///
/// Dropping the handle ends the join the same way [`Room::leave`] does,
/// except nobody awaits the cleanup.
pub struct Room {
    ns: String,
    info_hash: String,
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl Room {
    /// The joined namespace
    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// The swarm key this join announces under
    pub fn info_hash(&self) -> &str {
        &self.info_hash
    }

    /// Install the callback receiving verified, connected peers
    ///
    /// Until this is called a no-op stands in; peers whose channel opens
    /// before registration are dropped silently.
    pub fn on_peer_join(&self, callback: impl Fn(Arc<Peer>, String) + Send + Sync + 'static) {
        let _ = self
            .cmd_tx
            .send(RoomCommand::SetCallback(Arc::new(callback)));
    }

    /// Leave the namespace
    ///
    /// Releases the tracker listeners, frees the namespace, cancels the
    /// announce timer and destroys the unconnected offer pool. Tracker
    /// sockets stay open for other namespaces. Idempotent: calling twice
    /// is harmless.
    pub async fn leave(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(RoomCommand::Leave(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Join a namespace and start announcing
///
/// Fails synchronously with `EmptyTrackers` when no tracker URL survives
/// config trimming and `AlreadyJoined` when the namespace is occupied.
/// Must be called within a Tokio runtime; the first announce fires
/// immediately rather than waiting out the first timer period.
pub fn join_room(config: RoomConfig, ns: &str) -> Result<Room> {
    let tracker_urls = resolve_tracker_urls(&config)?;

    {
        let mut occupied = OCCUPIED_ROOMS.lock();
        if !occupied.insert(ns.to_string()) {
            return Err(Error::AlreadyJoined(ns.to_string()));
        }
    }

    let hash = info_hash(&config.app_id, ns);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    for url in &tracker_urls {
        let frames = frames_tx.clone();
        SOCKETS.add_listener(
            url,
            &hash,
            Arc::new(move |socket, text| {
                let sink: Arc<dyn FrameSink> = socket;
                let _ = frames.send((sink, text));
            }),
        );
    }

    let state = JoinState {
        ns: ns.to_string(),
        info_hash: hash.clone(),
        tracker_urls,
        keypair: config.signing_keypair,
        factory: config.peer_factory,
        rtc_config: config.rtc_config,
        announce_secs: DEFAULT_ANNOUNCE_SECS,
        pool: OfferPool::new(),
        handled_offers: HashSet::new(),
        connected_peers: HashSet::new(),
        on_peer: Arc::new(|_, _| {}),
        events_tx,
    };

    tokio::spawn(run_room(state, frames_rx, events_rx, cmd_rx));
    tracing::info!("Joined namespace {} as {}", ns, self_id());

    Ok(Room {
        ns: ns.to_string(),
        info_hash: hash,
        cmd_tx,
    })
}

/// Drive one joined namespace until it leaves
async fn run_room(
    mut state: JoinState,
    mut frames_rx: mpsc::UnboundedReceiver<(Arc<dyn FrameSink>, String)>,
    mut events_rx: mpsc::UnboundedReceiver<RoomEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
) {
    tracing::info!("Room event loop starting for {}", state.ns);

    let mut timer = tokio::time::interval(Duration::from_secs(state.announce_secs));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if let Err(e) = announce::announce(&mut state).await {
                    tracing::warn!("Announce for {} failed: {}", state.ns, e);
                }
            }

            Some((sink, text)) = frames_rx.recv() => {
                if let Some(secs) = signaling::handle_frame(&mut state, &sink, &text) {
                    tracing::debug!("Announce interval for {} now {}s", state.ns, secs);
                    let period = Duration::from_secs(secs);
                    timer = interval_at(Instant::now() + period, period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
            }

            Some(event) = events_rx.recv() => {
                handle_room_event(&mut state, event);
            }

            command = cmd_rx.recv() => match command {
                Some(RoomCommand::SetCallback(callback)) => state.on_peer = callback,
                Some(RoomCommand::Leave(ack)) => {
                    shutdown(&mut state);
                    let _ = ack.send(());
                    break;
                }
                // Every handle is gone; nobody can leave explicitly anymore
                None => {
                    shutdown(&mut state);
                    break;
                }
            }
        }
    }

    tracing::info!("Room event loop stopped for {}", state.ns);
}

/// Apply one peer-side event to the join state
pub(crate) fn handle_room_event(state: &mut JoinState, event: RoomEvent) {
    match event {
        RoomEvent::LocalAnswer {
            sink,
            to_peer_id,
            offer_id,
            desc,
        } => {
            let envelope = match sign_sdp(&state.keypair, &desc.sdp) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Failed to sign answer for {}: {}", to_peer_id, e);
                    return;
                }
            };
            let frame = AnswerAnnounce {
                action: ACTION_ANNOUNCE,
                info_hash: &state.info_hash,
                peer_id: self_id(),
                to_peer_id: &to_peer_id,
                offer_id: &offer_id,
                answer: SessionDesc {
                    kind: desc.kind,
                    sdp: envelope,
                },
            };
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if let Err(e) = sink.send_frame(text) {
                        tracing::warn!("Failed to send answer to {}: {}", to_peer_id, e);
                    }
                }
                Err(e) => tracing::warn!("Failed to encode answer frame: {}", e),
            }
        }

        RoomEvent::Connected {
            peer,
            peer_id,
            offer_id,
        } => {
            if state.connected_peers.contains(&peer_id) {
                tracing::debug!("Duplicate channel to {}, destroying", peer_id);
                peer.destroy();
                return;
            }
            if peer.key().is_none() {
                tracing::warn!("Peer {} connected without a verified key, dropping", peer_id);
                peer.destroy();
                return;
            }

            state.connected_peers.insert(peer_id.clone());
            if let Some(offer_id) = offer_id {
                state.connected_peers.insert(offer_id);
            }
            tracing::info!("Peer {} connected in {}", peer_id, state.ns);
            (state.on_peer)(peer, peer_id);
        }

        RoomEvent::Closed { peer_id } => {
            if state.connected_peers.remove(&peer_id) {
                tracing::info!("Peer {} disconnected from {}", peer_id, state.ns);
            }
        }
    }
}

/// Release everything this join holds; sockets stay open for other rooms
fn shutdown(state: &mut JoinState) {
    for url in &state.tracker_urls {
        SOCKETS.release_listener(url, &state.info_hash);
    }
    OCCUPIED_ROOMS.lock().remove(&state.ns);
    clean_pool(
        &mut state.pool,
        &state.handled_offers,
        &state.connected_peers,
    );
    state.handled_offers.clear();
    tracing::info!("Left namespace {}", state.ns);
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub(crate) fn test_state(
    ns: &str,
    factory: Arc<dyn PeerFactory>,
) -> (JoinState, mpsc::UnboundedReceiver<RoomEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let state = JoinState {
        ns: ns.to_string(),
        info_hash: info_hash("demo", ns),
        tracker_urls: vec!["ws://127.0.0.1:9/announce".into()],
        keypair: Arc::new(SigningKeyPair::generate()),
        factory,
        rtc_config: None,
        announce_secs: DEFAULT_ANNOUNCE_SECS,
        pool: OfferPool::new(),
        handled_offers: HashSet::new(),
        connected_peers: HashSet::new(),
        on_peer: Arc::new(|_, _| {}),
        events_tx,
    };
    (state, events_rx)
}

// ============================================================================
// TESTS
// ============================================================================
