//! Stormlink - realtime transport for the community flood-reporting client.
//!
//! This crate implements the hand-rolled text-framed publish/subscribe
//! protocol the Stormlink front end speaks over a single WebSocket: live
//! location telemetry, hazard report submission, emergency alert
//! raise/resolve, and inbound broadcast dispatch into the app's handlers
//! and hazard analyzer.
//!
//! # Architecture
//!
//! The crate follows an owner-task pattern:
//!
//! - **RealtimeClient** - Public handle; validates and queues outbound work
//! - **Runtime task** - Owns the socket, drives the connection lifecycle
//!   and the bounded linear-backoff reconnect policy
//! - **Frame codec** - Pure wire-format encode/decode
//! - **Inbound router** - Classifies broadcasts, normalizes legacy field
//!   spellings, dispatches per-message tasks through the analyzer
//! - **Telemetry scheduler** - Fixed-interval location sampling, active
//!   only while connected
//!
//! # Modules
//!
//! - [`client`] - Client handle, builder, and connection runtime
//! - [`frame`] - Wire codec
//! - [`inbound`] - Broadcast classification and dispatch
//! - [`outbound`] - Domain frame builders
//! - [`subscriptions`] - Replayable destination registry

// Library modules
pub mod analysis;
pub mod client;
pub mod frame;
pub mod inbound;
pub mod messages;
pub mod outbound;
pub mod position;
pub mod profile;
pub mod subscriptions;
pub mod types;
pub mod ws;

pub mod constants;

mod telemetry;

// Re-export commonly used types
pub use analysis::{HazardAnalyzer, HazardAssessment};
pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use inbound::{AlertEvent, ReportEvent};
pub use messages::{
    AlertBroadcast, AlertRaise, AlertRequest, LocationSample, ReportBroadcast, ReportDraft,
    SafetyStatus,
};
pub use position::{FixedPositionSource, PositionFix, PositionSource};
pub use profile::{ProfileSnapshot, StaticProfile, UserProfile};
pub use types::{ConnectionState, TransportError};
