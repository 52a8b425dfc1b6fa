//! Application-wide constants for stormlink.
//!
//! This module centralizes the protocol and scheduling constants so that
//! every timing or sizing decision is documented in one place. Constants
//! are grouped by domain.
//!
//! # Categories
//!
//! - **Protocol**: wire-format version and terminator
//! - **Reconnection**: retry ceiling and backoff base
//! - **Telemetry**: sampling cadence
//! - **Alerts**: defaults applied when the caller omits optional fields

use std::time::Duration;

// ============================================================================
// Protocol
// ============================================================================

/// Protocol version advertised in the CONNECT frame's `version` header.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Sentinel byte terminating every frame on the wire.
///
/// The NUL byte never appears inside headers or bodies; the encoder rejects
/// values that would violate this.
pub const FRAME_TERMINATOR: u8 = 0x00;

/// How long to wait for the server's first control frame (CONNECTED or
/// ERROR) after sending CONNECT, before the attempt is treated as failed.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Reconnection
// ============================================================================

/// Maximum number of automatic reconnect attempts after an unexpected close.
///
/// Once exhausted the client stays Closed until the caller invokes
/// `connect` again, which resets the attempt counter.
pub const RECONNECT_MAX_RETRIES: u32 = 5;

/// Base delay for the linear reconnect backoff.
///
/// The n-th retry waits `RECONNECT_BASE_DELAY * n`. Two seconds keeps the
/// first retry snappy on flaky mobile links while the fifth (10s) backs off
/// enough to ride out a server restart.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Telemetry
// ============================================================================

/// Default interval between location telemetry samples.
///
/// Five seconds matches the cadence the map views expect for live family
/// tracking without draining the device battery.
pub const TELEMETRY_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// Alerts
// ============================================================================

/// Default broadcast radius for a raised alert, in meters.
pub const DEFAULT_ALERT_RADIUS_M: u32 = 500;

/// Default time-to-live for a raised alert, in minutes.
pub const DEFAULT_ALERT_TTL_MIN: u32 = 30;
