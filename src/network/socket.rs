//! # Tracker Socket Registry
//!
//! One WebSocket per tracker URL, process-wide. Every namespace joined in
//! this process shares the same connection to a given tracker; inbound
//! frames fan out to all listeners registered under that URL, and each
//! listener self-filters by swarm key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SocketRegistry (process-wide)                              │
//! │                                                             │
//! │  sockets:   url → TrackerSocket (writer task + reader task) │
//! │  listeners: url → { info_hash → handler }                   │
//! │                                                             │
//! │  wss://tracker-a ──┬──► room "lobby"  (info_hash x)         │
//! │                    └──► room "annex"  (info_hash y)         │
//! │  wss://tracker-b ──┴──► both rooms, same fan-out            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry never reconnects on its own: the announce loop notices a
//! closed socket and forces a fresh one for the next send. Listener maps
//! are keyed by URL rather than by socket, so a forced reopen keeps
//! serving the rooms that were already subscribed. Sockets are long-lived
//! and are not closed when a room leaves.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

/// Process-wide socket registry shared by every joined namespace
pub(crate) static SOCKETS: Lazy<SocketRegistry> = Lazy::new(SocketRegistry::new);

/// Where answer frames go: the socket the triggering frame arrived on.
///
/// A trait seam so signaling can be exercised against an in-memory sink.
pub(crate) trait FrameSink: Send + Sync {
    /// Queue one JSON text frame for sending
    fn send_frame(&self, text: String) -> Result<()>;
    /// The tracker URL this sink writes to
    fn url(&self) -> &str;
}

/// Callback invoked with every text frame arriving on a URL
pub(crate) type FrameHandler = Arc<dyn Fn(Arc<TrackerSocket>, String) + Send + Sync>;

/// Lifecycle of a tracker socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketState {
    /// TCP/TLS/WebSocket handshake in flight
    Connecting,
    /// Ready to send
    Open,
    /// Gone; the next announce forces a replacement
    Closed,
}

/// A single shared WebSocket to one tracker
pub(crate) struct TrackerSocket {
    url: String,
    state: watch::Sender<SocketState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl TrackerSocket {
    fn new(url: &str) -> Arc<Self> {
        let (state, _) = watch::channel(SocketState::Connecting);
        Arc::new(Self {
            url: url.to_string(),
            state,
            outbound: Mutex::new(None),
        })
    }

    /// Current lifecycle state
    pub(crate) fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SocketState) {
        self.state.send_replace(state);
    }

    /// Wait until the connect attempt settled, returning the outcome
    pub(crate) async fn ready(&self) -> SocketState {
        let mut rx = self.state.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current != SocketState::Connecting {
                return current;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

impl FrameSink for TrackerSocket {
    fn send_frame(&self, text: String) -> Result<()> {
        let outbound = self.outbound.lock();
        match (&*outbound, self.state()) {
            (Some(tx), SocketState::Open) => tx
                .send(Message::Text(text))
                .map_err(|_| Error::StaleSocket(self.url.clone())),
            _ => Err(Error::StaleSocket(self.url.clone())),
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Owns every tracker socket and the per-URL listener maps
pub(crate) struct SocketRegistry {
    sockets: Mutex<HashMap<String, Arc<TrackerSocket>>>,
    listeners: Mutex<HashMap<String, HashMap<String, FrameHandler>>>,
}

impl SocketRegistry {
    fn new() -> Self {
        Self {
            sockets: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe a namespace's handler to frames from `url`
    pub(crate) fn add_listener(&self, url: &str, info_hash: &str, handler: FrameHandler) {
        self.listeners
            .lock()
            .entry(url.to_string())
            .or_default()
            .insert(info_hash.to_string(), handler);
    }

    /// Drop a namespace's handler for `url`; the socket stays open
    pub(crate) fn release_listener(&self, url: &str, info_hash: &str) {
        let mut listeners = self.listeners.lock();
        if let Some(map) = listeners.get_mut(url) {
            map.remove(info_hash);
            if map.is_empty() {
                listeners.remove(url);
            }
        }
    }

    /// Number of handlers currently subscribed to `url`
    pub(crate) fn listener_count(&self, url: &str) -> usize {
        self.listeners.lock().get(url).map_or(0, |m| m.len())
    }

    /// Get the socket for `url`, opening one if none exists, and wait for
    /// the connect attempt to settle
    pub(crate) async fn socket(&self, url: &str) -> Arc<TrackerSocket> {
        let socket = {
            let mut sockets = self.sockets.lock();
            match sockets.get(url) {
                Some(existing) => existing.clone(),
                None => {
                    let socket = TrackerSocket::new(url);
                    sockets.insert(url.to_string(), socket.clone());
                    tokio::spawn(run_socket(socket.clone()));
                    socket
                }
            }
        };
        socket.ready().await;
        socket
    }

    /// Replace the socket for `url` with a fresh connection
    ///
    /// Existing listeners keep receiving frames; only the transport is new.
    pub(crate) async fn force_reopen(&self, url: &str) -> Arc<TrackerSocket> {
        let socket = {
            let mut sockets = self.sockets.lock();
            let socket = TrackerSocket::new(url);
            sockets.insert(url.to_string(), socket.clone());
            tokio::spawn(run_socket(socket.clone()));
            socket
        };
        socket.ready().await;
        socket
    }

    /// Fan one inbound frame out to every listener subscribed to the URL
    fn dispatch(&self, socket: &Arc<TrackerSocket>, text: String) {
        let handlers: Vec<FrameHandler> = {
            let listeners = self.listeners.lock();
            listeners
                .get(socket.url())
                .map(|map| map.values().cloned().collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(socket.clone(), text.clone());
        }
    }
}

/// Drive one socket: connect, then pump outbound and inbound until either
/// side goes away
async fn run_socket(socket: Arc<TrackerSocket>) {
    let ws = match connect_async(socket.url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::warn!(url = %socket.url, error = %e, "Tracker connection failed");
            socket.set_state(SocketState::Closed);
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    *socket.outbound.lock() = Some(tx);
    socket.set_state(SocketState::Open);
    tracing::debug!(url = %socket.url, "Tracker socket open");

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => SOCKETS.dispatch(&socket, text),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(url = %socket.url, error = %e, "Tracker socket error");
                    break;
                }
                None => break,
            },
        }
    }

    socket.set_state(SocketState::Closed);
    tracing::debug!(url = %socket.url, "Tracker socket closed");
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_bookkeeping() {
        let url = "wss://bookkeeping.test/announce";
        let handler: FrameHandler = Arc::new(|_, _| {});

        SOCKETS.add_listener(url, "hash-a", handler.clone());
        SOCKETS.add_listener(url, "hash-b", handler.clone());
        assert_eq!(SOCKETS.listener_count(url), 2);

        // Re-adding under the same swarm key replaces, not duplicates
        SOCKETS.add_listener(url, "hash-a", handler);
        assert_eq!(SOCKETS.listener_count(url), 2);

        SOCKETS.release_listener(url, "hash-a");
        assert_eq!(SOCKETS.listener_count(url), 1);
        SOCKETS.release_listener(url, "hash-b");
        assert_eq!(SOCKETS.listener_count(url), 0);

        // Releasing an unknown listener is harmless
        SOCKETS.release_listener(url, "hash-a");
    }

    #[test]
    fn test_dispatch_fans_out_per_url() {
        let url = "wss://dispatch.test/announce";
        let socket = TrackerSocket::new(url);
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        SOCKETS.add_listener(
            url,
            "hash-a",
            Arc::new(move |_, text| sink.lock().push(format!("a:{}", text))),
        );
        let sink = seen.clone();
        SOCKETS.add_listener(
            url,
            "hash-b",
            Arc::new(move |_, text| sink.lock().push(format!("b:{}", text))),
        );

        SOCKETS.dispatch(&socket, "{}".to_string());
        let mut frames = seen.lock().clone();
        frames.sort();
        assert_eq!(frames, vec!["a:{}", "b:{}"]);

        SOCKETS.release_listener(url, "hash-a");
        SOCKETS.release_listener(url, "hash-b");
        SOCKETS.dispatch(&socket, "{}".to_string());
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_send_on_unopened_socket_is_stale() {
        let socket = TrackerSocket::new("wss://stale.test/announce");
        assert_eq!(socket.state(), SocketState::Connecting);
        assert!(matches!(
            socket.send_frame("{}".into()),
            Err(Error::StaleSocket(_))
        ));
    }

    #[tokio::test]
    async fn test_ready_waits_for_settled_state() {
        let socket = TrackerSocket::new("wss://ready.test/announce");
        let waiter = socket.clone();
        let handle = tokio::spawn(async move { waiter.ready().await });

        socket.set_state(SocketState::Closed);
        assert_eq!(handle.await.unwrap(), SocketState::Closed);
    }

    #[tokio::test]
    async fn test_failed_connect_settles_closed() {
        // Nothing listens on this port; connect fails fast and the socket
        // settles as Closed rather than hanging callers.
        let socket = SOCKETS.socket("ws://127.0.0.1:9/announce").await;
        assert_eq!(socket.state(), SocketState::Closed);
    }
}
