//! # Peer Surface
//!
//! The WebRTC peer-connection primitive is an external collaborator: the
//! embedder (browser runtime, `webrtc`-rs, a test double) implements
//! [`PeerConnection`] and [`PeerFactory`], and the signaling core drives
//! the handshake through that surface without knowing the transport.
//!
//! The surface is a small capability record over three events:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  PeerConnection                                          │
//! │                                                          │
//! │  signal(desc)    feed a remote session description in    │
//! │  destroy()       tear the connection down                │
//! │  destroyed()     has it been torn down?                  │
//! │  on / once       subscribe to events:                    │
//! │                                                          │
//! │    Signal(desc)  the peer produced a local description   │
//! │    Connect       the channel is up                       │
//! │    Close         the channel went away                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Peer`] wraps a connection with the slot for the counterparty's
//! verified signing key; it is the handle rooms hand to the application.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::crypto::VerifyingKey;

/// A WebRTC session description as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDesc {
    /// Description type: `"offer"` or `"answer"`
    #[serde(rename = "type")]
    pub kind: String,
    /// The SDP text (or, on the tracker wire, a signed-SDP envelope)
    pub sdp: String,
}

impl SessionDesc {
    /// Build an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".into(),
            sdp: sdp.into(),
        }
    }

    /// Build an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".into(),
            sdp: sdp.into(),
        }
    }
}

/// Events a peer connection can emit
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The connection produced a local session description
    Signal(SessionDesc),
    /// The channel reached the connected state
    Connect,
    /// The channel closed
    Close,
}

/// Discriminant used to subscribe to a class of [`PeerEvent`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerEventKind {
    /// Local session descriptions
    Signal,
    /// Channel up
    Connect,
    /// Channel down
    Close,
}

impl PeerEvent {
    /// The kind of this event
    pub fn kind(&self) -> PeerEventKind {
        match self {
            PeerEvent::Signal(_) => PeerEventKind::Signal,
            PeerEvent::Connect => PeerEventKind::Connect,
            PeerEvent::Close => PeerEventKind::Close,
        }
    }
}

/// Callback registered against a peer event
pub type EventHandler = Box<dyn FnMut(PeerEvent) + Send>;

/// The signaling surface of the external WebRTC primitive
pub trait PeerConnection: Send + Sync {
    /// Feed a remote session description into the connection
    fn signal(&self, desc: SessionDesc);

    /// Tear the connection down
    fn destroy(&self);

    /// Whether the connection has been torn down
    fn destroyed(&self) -> bool;

    /// Subscribe to every occurrence of an event kind
    fn on(&self, kind: PeerEventKind, handler: EventHandler);

    /// Subscribe to the next occurrence of an event kind
    fn once(&self, kind: PeerEventKind, handler: EventHandler);
}

/// Creates peer connections on demand
///
/// `initiator` peers produce an offer as their first `Signal` event;
/// responders produce an answer after a remote offer is signaled in.
pub trait PeerFactory: Send + Sync {
    /// Create a fresh connection in the given role
    fn create(
        &self,
        initiator: bool,
        rtc_config: Option<&serde_json::Value>,
    ) -> Arc<dyn PeerConnection>;
}

/// A peer connection plus the key slot the handshake pins on verification
///
/// The key is populated exactly when the counterparty's signed SDP passed
/// ECDSA verification; a [`Peer`] is only handed to the application's
/// connect callback after that happened.
pub struct Peer {
    conn: Arc<dyn PeerConnection>,
    key: Mutex<Option<VerifyingKey>>,
}

impl Peer {
    /// Wrap a freshly created connection
    pub(crate) fn new(conn: Arc<dyn PeerConnection>) -> Arc<Self> {
        Arc::new(Self {
            conn,
            key: Mutex::new(None),
        })
    }

    /// The counterparty's verified signing key, once pinned
    pub fn key(&self) -> Option<VerifyingKey> {
        self.key.lock().clone()
    }

    /// Pin the counterparty's verified key
    pub(crate) fn set_key(&self, key: VerifyingKey) {
        *self.key.lock() = Some(key);
    }

    /// Feed a remote session description into the connection
    pub fn signal(&self, desc: SessionDesc) {
        self.conn.signal(desc);
    }

    /// Tear the connection down
    pub fn destroy(&self) {
        self.conn.destroy();
    }

    /// Whether the connection has been torn down
    pub fn destroyed(&self) -> bool {
        self.conn.destroyed()
    }

    /// The underlying connection surface
    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.conn
    }
}

// ============================================================================
// TEST DOUBLES
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::MockPeer;
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(
            PeerEvent::Signal(SessionDesc::offer("x")).kind(),
            PeerEventKind::Signal
        );
        assert_eq!(PeerEvent::Connect.kind(), PeerEventKind::Connect);
        assert_eq!(PeerEvent::Close.kind(), PeerEventKind::Close);
    }

    #[test]
    fn test_once_handler_consumed() {
        let mock = MockPeer::new();
        let fired = Arc::new(Mutex::new(0));
        let counter = fired.clone();
        mock.once(
            PeerEventKind::Connect,
            Box::new(move |_| *counter.lock() += 1),
        );

        mock.emit(PeerEvent::Connect);
        mock.emit(PeerEvent::Connect);
        assert_eq!(*fired.lock(), 1);
        assert_eq!(mock.handler_count(), 0);
    }

    #[test]
    fn test_on_handler_persists() {
        let mock = MockPeer::new();
        let fired = Arc::new(Mutex::new(0));
        let counter = fired.clone();
        mock.on(
            PeerEventKind::Close,
            Box::new(move |_| *counter.lock() += 1),
        );

        mock.emit(PeerEvent::Close);
        mock.emit(PeerEvent::Close);
        assert_eq!(*fired.lock(), 2);
    }

    #[test]
    fn test_peer_key_slot() {
        let mock = MockPeer::new();
        let peer = Peer::new(mock);
        assert!(peer.key().is_none());

        let keypair = crate::crypto::SigningKeyPair::generate();
        peer.set_key(keypair.verifying_key());
        assert_eq!(peer.key(), Some(keypair.verifying_key()));
    }

    #[test]
    fn test_peer_delegates_to_connection() {
        let mock = MockPeer::new();
        let peer = Peer::new(mock.clone());

        peer.signal(SessionDesc::answer("remote"));
        assert_eq!(mock.signaled(), vec![SessionDesc::answer("remote")]);

        assert!(!peer.destroyed());
        peer.destroy();
        assert!(peer.destroyed());
    }
}
