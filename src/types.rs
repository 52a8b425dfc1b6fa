//! Connection state and error taxonomy for the realtime transport.
//!
//! The state enum mirrors the four-phase connection lifecycle; the error
//! enum is the single seam every fallible library operation reports
//! through. Transport-level detail (tungstenite, TLS) never leaks past
//! this module — it arrives here already stringified.

// Rust guideline compliant 2026-02

use std::sync::{Arc, RwLock};

use crate::frame::FrameError;

/// Connection lifecycle state.
///
/// Transitions: Idle → Connecting → Connected → Closed, with Closed →
/// Connecting driven by the automatic reconnect policy and Closed/Idle →
/// Connecting by an explicit `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket; nothing in flight.
    #[default]
    Idle,
    /// Socket opened, CONNECT sent, awaiting the server's first control frame.
    Connecting,
    /// CONNECTED received; sends are accepted and telemetry may run.
    Connected,
    /// Socket gone (either side closed, or a server ERROR). Reconnects may
    /// still be pending; once the retry budget is spent the state stays here.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Shared connection state observable from outside the runtime task.
///
/// Uses std `RwLock` rather than the async flavor so UI polling code can
/// query it from synchronous contexts.
#[derive(Debug, Default)]
pub struct SharedState {
    state: RwLock<ConnectionState>,
    identity: RwLock<Option<String>>,
}

impl SharedState {
    /// Create new shared state wrapped for sharing with the runtime task.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn get(&self) -> ConnectionState {
        *self.state.read().expect("state lock poisoned")
    }

    /// Record a lifecycle transition.
    pub(crate) fn set(&self, new_state: ConnectionState) {
        *self.state.write().expect("state lock poisoned") = new_state;
    }

    /// Whether the connection is currently usable for sends.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    /// The identity supplied to the most recent `connect`, if any.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.identity.read().expect("identity lock poisoned").clone()
    }

    pub(crate) fn set_identity(&self, identity: Option<String>) {
        *self.identity.write().expect("identity lock poisoned") = identity;
    }
}

/// Errors surfaced by the realtime transport.
#[derive(Debug)]
pub enum TransportError {
    /// An outbound operation was attempted while not Connected. The caller
    /// owns the retry; nothing was buffered or written.
    NotConnected,
    /// Opening the socket or completing the handshake failed.
    ConnectionFailed(String),
    /// The server answered the handshake with an ERROR frame.
    Rejected(String),
    /// The server's first control frame did not arrive in time.
    HandshakeTimeout,
    /// A frame could not be handed to the socket writer.
    SendFailed(String),
    /// A builder contract check failed; nothing was sent.
    Validation(String),
    /// Frame encoding rejected the input.
    Frame(FrameError),
    /// The client runtime has shut down.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected by server: {msg}"),
            Self::HandshakeTimeout => write!(f, "timed out waiting for server handshake"),
            Self::SendFailed(msg) => write!(f, "send failed: {msg}"),
            Self::Validation(msg) => write!(f, "validation failed: {msg}"),
            Self::Frame(err) => write!(f, "frame error: {err}"),
            Self::Closed => write!(f, "client closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}
