//! # Signaling Handler
//!
//! Turns inbound tracker frames into peer handshakes.
//!
//! An offer spawns a responder peer, wires its first local description
//! into a signed answer frame, and only signals the remote description in
//! after the envelope verified. An answer is matched against the offer
//! pool and signaled into the pooled peer under the same verification
//! gate. Either way the de-duplication flags are set before anything else
//! happens, so a replayed offer (or the same peer arriving through a
//! second tracker) is suppressed, never doubled.

use std::sync::Arc;

use crate::crypto::verify_sdp;
use crate::error::Error;

use super::peer::{Peer, PeerConnection, PeerEvent, PeerEventKind, SessionDesc};
use super::protocol::{adapted_interval, TrackerFrame};
use super::room::{JoinState, RoomEvent};
use super::self_id;
use super::socket::FrameSink;

/// Handle one inbound tracker frame for a joined namespace
///
/// Returns the new announce period when the frame carried a usable
/// interval hint, so the caller can reset its timer.
pub(crate) fn handle_frame(
    state: &mut JoinState,
    sink: &Arc<dyn FrameSink>,
    text: &str,
) -> Option<u64> {
    let frame: TrackerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("{}", Error::BadFrame(e.to_string()));
            return None;
        }
    };
    let TrackerFrame {
        info_hash,
        peer_id,
        offer_id,
        offer,
        answer,
        interval,
        failure_reason,
    } = frame;

    // Frames for other swarms on the shared socket, and echoes of our own
    // announces, are not ours. Failure notices carry no info_hash, so the
    // mismatch test only applies when the field is present.
    if matches!(&info_hash, Some(hash) if hash != &state.info_hash) {
        return None;
    }
    if peer_id.as_deref() == Some(self_id()) {
        return None;
    }

    if let Some(reason) = failure_reason {
        tracing::warn!("{}", Error::TrackerFailure(reason));
        return None;
    }

    let adapted = interval.and_then(|hint| adapted_interval(state.announce_secs, hint));
    if let Some(secs) = adapted {
        state.announce_secs = secs;
    }

    match (offer, answer, offer_id, peer_id) {
        (Some(offer), _, Some(offer_id), Some(peer_id)) => {
            handle_offer(state, sink, peer_id, offer_id, offer);
        }
        (None, Some(answer), Some(offer_id), Some(peer_id)) => {
            handle_answer(state, peer_id, offer_id, answer);
        }
        _ => {}
    }

    adapted
}

/// A remote offer: spawn a responder, arrange the signed answer, verify
fn handle_offer(
    state: &mut JoinState,
    sink: &Arc<dyn FrameSink>,
    peer_id: String,
    offer_id: String,
    offer: SessionDesc,
) {
    if state.connected_peers.contains(&peer_id) || state.handled_offers.contains(&offer_id) {
        tracing::debug!("Suppressing duplicate offer {} from {}", offer_id, peer_id);
        return;
    }
    state.handled_offers.insert(offer_id.clone());

    let conn = state.factory.create(false, state.rtc_config.as_ref());
    let peer = Peer::new(conn.clone());

    // The responder's first local description becomes the answer frame,
    // sent back on the socket the offer arrived on
    let events = state.events_tx.clone();
    let mut reply = Some((sink.clone(), peer_id.clone(), offer_id.clone()));
    conn.once(
        PeerEventKind::Signal,
        Box::new(move |event| {
            if let (PeerEvent::Signal(desc), Some((sink, to_peer_id, offer_id))) =
                (event, reply.take())
            {
                let _ = events.send(RoomEvent::LocalAnswer {
                    sink,
                    to_peer_id,
                    offer_id,
                    desc,
                });
            }
        }),
    );

    register_lifecycle(state, &peer, &conn, &peer_id, None);

    match verify_sdp(&offer.sdp) {
        Ok(verified) if verified.verified => {
            peer.set_key(verified.key);
            peer.signal(SessionDesc {
                kind: offer.kind,
                sdp: verified.sdp,
            });
        }
        Ok(_) => tracing::warn!("{}: offer from {}", Error::Unverified, peer_id),
        Err(e) => tracing::warn!("{}: offer from {}", e, peer_id),
    }
}

/// A remote answer: match it to the pooled offer it answers, verify
fn handle_answer(state: &mut JoinState, peer_id: String, offer_id: String, answer: SessionDesc) {
    if state.connected_peers.contains(&peer_id) || state.handled_offers.contains(&offer_id) {
        tracing::debug!("Suppressing duplicate answer {} from {}", offer_id, peer_id);
        return;
    }
    let peer = match state.pool.get(&offer_id) {
        Some(entry) if !entry.peer.destroyed() => entry.peer.clone(),
        _ => {
            tracing::debug!("Answer for unknown or dead offer {}", offer_id);
            return;
        }
    };
    state.handled_offers.insert(offer_id.clone());

    register_lifecycle(state, &peer, peer.connection(), &peer_id, Some(offer_id));

    match verify_sdp(&answer.sdp) {
        Ok(verified) if verified.verified => {
            peer.set_key(verified.key);
            peer.signal(SessionDesc {
                kind: answer.kind,
                sdp: verified.sdp,
            });
        }
        Ok(_) => tracing::warn!("{}: answer from {}", Error::Unverified, peer_id),
        Err(e) => tracing::warn!("{}: answer from {}", e, peer_id),
    }
}

/// Route the peer's connect/close events back into the room task
fn register_lifecycle(
    state: &JoinState,
    peer: &Arc<Peer>,
    conn: &Arc<dyn PeerConnection>,
    peer_id: &str,
    offer_id: Option<String>,
) {
    let events = state.events_tx.clone();
    let connected = peer.clone();
    let id = peer_id.to_string();
    conn.on(
        PeerEventKind::Connect,
        Box::new(move |_| {
            let _ = events.send(RoomEvent::Connected {
                peer: connected.clone(),
                peer_id: id.clone(),
                offer_id: offer_id.clone(),
            });
        }),
    );

    let events = state.events_tx.clone();
    let id = peer_id.to_string();
    conn.on(
        PeerEventKind::Close,
        Box::new(move |_| {
            let _ = events.send(RoomEvent::Closed {
                peer_id: id.clone(),
            });
        }),
    );
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use crate::crypto::{sign_sdp, verify_sdp, SigningKeyPair};
    use crate::error::Result;
    use crate::network::peer::testing::{MockPeer, MockPeerFactory};
    use crate::network::pool::make_offers;
    use crate::network::room::{handle_room_event, test_state, JoinState, RoomEvent};
    use crate::network::{self_id, PeerEvent, SessionDesc};

    use super::super::socket::FrameSink;
    use super::handle_frame;

    /// In-memory stand-in for a tracker socket
    struct MockSink {
        frames: Mutex<Vec<String>>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().clone()
        }
    }

    impl FrameSink for MockSink {
        fn send_frame(&self, text: String) -> Result<()> {
            self.frames.lock().push(text);
            Ok(())
        }

        fn url(&self) -> &str {
            "wss://mock.test/announce"
        }
    }

    struct Fixture {
        state: JoinState,
        events_rx: mpsc::UnboundedReceiver<RoomEvent>,
        factory: Arc<MockPeerFactory>,
        sink: Arc<MockSink>,
        dyn_sink: Arc<dyn FrameSink>,
        remote_keypair: SigningKeyPair,
    }

    fn fixture(ns: &str) -> Fixture {
        let factory = MockPeerFactory::new(true);
        let (state, events_rx) = test_state(ns, factory.clone());
        let sink = MockSink::new();
        Fixture {
            state,
            events_rx,
            factory,
            dyn_sink: sink.clone(),
            sink,
            remote_keypair: SigningKeyPair::generate(),
        }
    }

    fn offer_frame(fx: &Fixture, peer_id: &str, offer_id: &str, sdp: &str) -> String {
        let envelope = sign_sdp(&fx.remote_keypair, sdp).unwrap();
        serde_json::json!({
            "info_hash": fx.state.info_hash,
            "peer_id": peer_id,
            "offer_id": offer_id,
            "offer": {"type": "offer", "sdp": envelope},
        })
        .to_string()
    }

    fn answer_frame(fx: &Fixture, peer_id: &str, offer_id: &str, sdp: &str) -> String {
        let envelope = sign_sdp(&fx.remote_keypair, sdp).unwrap();
        serde_json::json!({
            "info_hash": fx.state.info_hash,
            "peer_id": peer_id,
            "offer_id": offer_id,
            "answer": {"type": "answer", "sdp": envelope},
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_offer_spawns_verified_responder() {
        let mut fx = fixture("offer-happy");
        let frame = offer_frame(&fx, "alice", "offer-1", "v=0 alice-offer");
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);

        // A responder (non-initiator) peer was created and got the
        // verified inner SDP signaled in
        let created = fx.factory.created();
        assert_eq!(created.len(), 1);
        let (initiator, responder) = &created[0];
        assert!(!initiator);
        assert_eq!(
            responder.signaled(),
            vec![SessionDesc::offer("v=0 alice-offer")]
        );
        assert!(fx.state.handled_offers.contains("offer-1"));

        // The responder's local description turns into a signed answer
        // on the same socket the offer came from
        responder.emit(PeerEvent::Signal(SessionDesc::answer("v=0 my-answer")));
        let event = fx.events_rx.try_recv().expect("local answer event");
        handle_room_event(&mut fx.state, event);

        let frames = fx.sink.frames();
        assert_eq!(frames.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(sent["action"], "announce");
        assert_eq!(sent["to_peer_id"], "alice");
        assert_eq!(sent["offer_id"], "offer-1");
        assert_eq!(sent["peer_id"], self_id());
        let answer_envelope = sent["answer"]["sdp"].as_str().unwrap();
        let verified = verify_sdp(answer_envelope).unwrap();
        assert!(verified.verified);
        assert_eq!(verified.sdp, "v=0 my-answer");

        // On connect the peer reaches the callback with the pinned key
        let connected = Arc::new(Mutex::new(Vec::new()));
        let seen = connected.clone();
        let remote_key = fx.remote_keypair.verifying_key();
        fx.state.on_peer = Arc::new(move |peer, peer_id| {
            assert_eq!(peer.key(), Some(remote_key.clone()));
            seen.lock().push(peer_id);
        });

        responder.emit(PeerEvent::Connect);
        let event = fx.events_rx.try_recv().expect("connect event");
        handle_room_event(&mut fx.state, event);
        assert_eq!(connected.lock().clone(), vec!["alice".to_string()]);
        assert!(fx.state.connected_peers.contains("alice"));
    }

    #[tokio::test]
    async fn test_duplicate_offer_across_trackers_suppressed() {
        let mut fx = fixture("offer-dup");
        let frame = offer_frame(&fx, "alice", "offer-1", "v=0 alice-offer");

        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);
        // Same offer again, as a redundant tracker would deliver it
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);

        assert_eq!(fx.factory.created().len(), 1);
    }

    #[tokio::test]
    async fn test_offer_from_connected_peer_suppressed() {
        let mut fx = fixture("offer-connected");
        fx.state.connected_peers.insert("alice".into());

        let frame = offer_frame(&fx, "alice", "offer-2", "v=0 later-offer");
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);

        assert!(fx.factory.created().is_empty());
        assert!(!fx.state.handled_offers.contains("offer-2"));
    }

    #[tokio::test]
    async fn test_tampered_offer_never_signals() {
        let mut fx = fixture("offer-tampered");
        let frame = offer_frame(&fx, "mallory", "offer-1", "v=0 evil");

        // Flip a byte inside the envelope's signature
        let mut parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let envelope = parsed["offer"]["sdp"].as_str().unwrap();
        let tampered = envelope.replacen("\"signature\":\"A", "\"signature\":\"B", 1);
        parsed["offer"]["sdp"] = serde_json::Value::String(if tampered != envelope {
            tampered
        } else {
            // First signature char was not 'A'; corrupt the sdp instead
            envelope.replacen("v=0", "v=9", 1)
        });

        handle_frame(&mut fx.state, &fx.dyn_sink, &parsed.to_string());

        // The responder exists but was never signaled, no answer was sent,
        // and no peer reached the callback
        let created = fx.factory.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].1.signaled().is_empty());
        assert!(fx.sink.frames().is_empty());
        assert!(fx.events_rx.try_recv().is_err());
        // The offer still counts as handled; replays stay suppressed
        assert!(fx.state.handled_offers.contains("offer-1"));
    }

    #[tokio::test]
    async fn test_answer_signals_into_pooled_peer() {
        let mut fx = fixture("answer-happy");
        fx.state.pool = make_offers(&*fx.state.factory, None, 2);
        let offer_id = fx.state.pool.keys().next().unwrap().clone();

        let frame = answer_frame(&fx, "bob", &offer_id, "v=0 bob-answer");
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);

        let entry = &fx.state.pool[&offer_id];
        assert_eq!(entry.peer.key(), Some(fx.remote_keypair.verifying_key()));
        assert!(fx.state.handled_offers.contains(&offer_id));

        // The pooled connection received the verified answer
        let pooled = fx
            .factory
            .created()
            .iter()
            .find(|(_, peer)| !peer.signaled().is_empty())
            .map(|(_, peer)| peer.clone())
            .expect("signaled pooled peer");
        assert_eq!(pooled.signaled(), vec![SessionDesc::answer("v=0 bob-answer")]);

        // Connect marks both the peer id and the consumed offer id
        pooled.emit(PeerEvent::Connect);
        let event = fx.events_rx.try_recv().expect("connect event");
        handle_room_event(&mut fx.state, event);
        assert!(fx.state.connected_peers.contains("bob"));
        assert!(fx.state.connected_peers.contains(&offer_id));
    }

    #[tokio::test]
    async fn test_answer_for_unknown_offer_dropped() {
        let mut fx = fixture("answer-unknown");
        fx.state.pool = make_offers(&*fx.state.factory, None, 1);

        let frame = answer_frame(&fx, "bob", "no-such-offer-id-000", "v=0 stray");
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);

        assert!(!fx.state.handled_offers.contains("no-such-offer-id-000"));
        assert!(fx
            .factory
            .created()
            .iter()
            .all(|(_, peer)| peer.signaled().is_empty()));
    }

    #[tokio::test]
    async fn test_answer_replay_suppressed() {
        let mut fx = fixture("answer-replay");
        fx.state.pool = make_offers(&*fx.state.factory, None, 1);
        let offer_id = fx.state.pool.keys().next().unwrap().clone();

        let frame = answer_frame(&fx, "bob", &offer_id, "v=0 bob-answer");
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);
        handle_frame(&mut fx.state, &fx.dyn_sink, &frame);

        let signaled: usize = fx
            .factory
            .created()
            .iter()
            .map(|(_, peer)| peer.signaled().len())
            .sum();
        assert_eq!(signaled, 1);
    }

    #[tokio::test]
    async fn test_foreign_and_own_frames_ignored() {
        let mut fx = fixture("filter");

        // Wrong swarm key
        let mut foreign: serde_json::Value =
            serde_json::from_str(&offer_frame(&fx, "alice", "offer-1", "v=0 x")).unwrap();
        foreign["info_hash"] = serde_json::Value::String("someotherswarmkey000".into());
        handle_frame(&mut fx.state, &fx.dyn_sink, &foreign.to_string());

        // Our own announce echoed back
        let own = offer_frame(&fx, self_id(), "offer-2", "v=0 y");
        handle_frame(&mut fx.state, &fx.dyn_sink, &own);

        assert!(fx.factory.created().is_empty());
        assert!(fx.state.handled_offers.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_failure_frames_dropped() {
        let mut fx = fixture("garbage");

        assert_eq!(handle_frame(&mut fx.state, &fx.dyn_sink, "{not json"), None);
        assert_eq!(
            handle_frame(
                &mut fx.state,
                &fx.dyn_sink,
                r#"{"failure reason": "swarm full"}"#
            ),
            None
        );
        assert!(fx.factory.created().is_empty());
    }

    #[tokio::test]
    async fn test_interval_hint_grows_announce_period() {
        let mut fx = fixture("interval");

        let hint = serde_json::json!({
            "info_hash": fx.state.info_hash,
            "interval": 90,
        })
        .to_string();
        assert_eq!(handle_frame(&mut fx.state, &fx.dyn_sink, &hint), Some(90));
        assert_eq!(fx.state.announce_secs, 90);

        // A faster hint later is ignored; the period never shrinks
        let shrink = serde_json::json!({
            "info_hash": fx.state.info_hash,
            "interval": 10,
        })
        .to_string();
        assert_eq!(handle_frame(&mut fx.state, &fx.dyn_sink, &shrink), None);
        assert_eq!(fx.state.announce_secs, 90);

        // Hints beyond the cap are ignored too
        let excessive = serde_json::json!({
            "info_hash": fx.state.info_hash,
            "interval": 600,
        })
        .to_string();
        assert_eq!(handle_frame(&mut fx.state, &fx.dyn_sink, &excessive), None);
        assert_eq!(fx.state.announce_secs, 90);
    }
}
