//! # Error Handling
//!
//! Error types for Murmur Core.
//!
//! Only the join-time validators are fatal. Everything the tracker or a
//! remote peer can throw at a running room (malformed frames, failure
//! notices, bad signatures, stale sockets) is logged and dropped, and the
//! announce loop heals itself on the next tick.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Error                                                      │
//! │  │                                                          │
//! │  ├── Join Errors (fatal, thrown synchronously)              │
//! │  │   ├── EmptyTrackers   - no tracker URL after trimming    │
//! │  │   └── AlreadyJoined   - namespace already occupied       │
//! │  │                                                          │
//! │  ├── Signaling Errors (warn and drop the frame)             │
//! │  │   ├── BadFrame        - tracker frame not valid JSON     │
//! │  │   ├── TrackerFailure  - tracker sent "failure reason"    │
//! │  │   ├── BadEnvelope     - signed-SDP envelope unparseable  │
//! │  │   └── Unverified      - SDP signature check failed       │
//! │  │                                                          │
//! │  ├── Crypto Errors                                          │
//! │  │   ├── SigningFailed / InvalidKey                         │
//! │  │   └── EncryptionFailed / DecryptionFailed                │
//! │  │                                                          │
//! │  └── Transport Errors                                       │
//! │      ├── StaleSocket     - socket neither open nor opening  │
//! │      └── Serialization   - JSON encode/decode failure       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for Murmur Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Murmur Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Join Errors
    // ========================================================================

    /// No tracker URL survived config trimming
    #[error("No tracker URLs configured. Provide trackerUrls or rely on the defaults.")]
    EmptyTrackers,

    /// The namespace is already joined in this process
    #[error("Namespace \"{0}\" is already joined. Leave it before joining again.")]
    AlreadyJoined(String),

    // ========================================================================
    // Signaling Errors
    // ========================================================================

    /// A tracker frame was not valid JSON
    #[error("Unparseable tracker frame: {0}")]
    BadFrame(String),

    /// The tracker reported a failure reason
    #[error("Tracker failure: {0}")]
    TrackerFailure(String),

    /// A signed-SDP envelope could not be parsed
    #[error("Bad signed-SDP envelope: {0}")]
    BadEnvelope(String),

    /// An SDP signature did not verify against the embedded key
    #[error("SDP signature verification failed")]
    Unverified,

    // ========================================================================
    // Crypto Errors
    // ========================================================================

    /// Signing an SDP failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// A public key could not be imported
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Room-password encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Room-password decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================

    /// A tracker socket is neither open nor connecting
    #[error("Tracker socket to {0} is stale")]
    StaleSocket(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error aborts a `join_room` call.
    ///
    /// Everything else is a per-frame or per-tick condition that the
    /// announce loop recovers from on its own.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::EmptyTrackers | Error::AlreadyJoined(_))
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
