//! Position source seam.
//!
//! The transport never talks to a GPS directly. It consumes positions
//! through [`PositionSource`]: one on-demand "current fix" capability plus
//! an optional watch stream a high-frequency source can expose. Watch
//! updates never trigger sends by themselves — the telemetry scheduler
//! samples whatever the freshest value is on its own cadence.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::messages::epoch_ms;

/// A raw position fix as produced by the device (or a stub).
///
/// Carries no safety status — that is the user's declaration, supplied by
/// the profile accessor, not something a GPS can know.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy_m: f64,
    /// Fix time, epoch milliseconds.
    pub captured_at_ms: i64,
}

/// Source of position fixes.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Produce one current fix.
    ///
    /// # Errors
    ///
    /// Returns an error when no fix is available (no signal, permissions
    /// revoked); the telemetry scheduler logs and skips that tick.
    async fn current_fix(&self) -> anyhow::Result<PositionFix>;

    /// Optional continuous fix stream.
    ///
    /// Sources that can push updates cheaply expose a watch receiver whose
    /// latest value the scheduler prefers over an on-demand call. The
    /// default is `None` (on-demand only).
    fn watch_fixes(&self) -> Option<watch::Receiver<Option<PositionFix>>> {
        None
    }
}

/// Fixed-position source for tests and simulator builds.
#[derive(Debug, Clone)]
pub struct FixedPositionSource {
    lat: f64,
    lon: f64,
    accuracy_m: f64,
}

impl FixedPositionSource {
    /// Create a source that always reports the given coordinates.
    #[must_use]
    pub fn new(lat: f64, lon: f64, accuracy_m: f64) -> Self {
        Self {
            lat,
            lon,
            accuracy_m,
        }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn current_fix(&self) -> anyhow::Result<PositionFix> {
        Ok(PositionFix {
            lat: self.lat,
            lon: self.lon,
            accuracy_m: self.accuracy_m,
            captured_at_ms: epoch_ms(),
        })
    }
}
