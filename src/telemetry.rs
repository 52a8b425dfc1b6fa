//! Background location-telemetry scheduler.
//!
//! Runs only while the connection is up: the connection runtime spawns the
//! task after a successful handshake (and subscription replay) and stops it
//! on every disconnect, pause, or close. Each tick takes the freshest fix —
//! the watch value if the position source exposes a stream, otherwise one
//! on-demand call — composes a [`LocationSample`] with the profile's
//! current safety status, and funnels it through the location builder into
//! the connection's send path.
//!
//! A failed tick logs and skips; the next tick simply tries again. Watch
//! updates never send on their own, so a high-frequency stream can never
//! fan out into unbounded concurrent sends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::client::FrameSink;
use crate::messages::LocationSample;
use crate::outbound;
use crate::position::{PositionFix, PositionSource};
use crate::profile::{ProfileSnapshot, UserProfile};

/// Handle to a running telemetry loop.
///
/// Dropping the handle stops the loop just like [`TelemetryTask::stop`];
/// the connection runtime keeps one per live session.
#[derive(Debug)]
pub(crate) struct TelemetryTask {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TelemetryTask {
    /// Spawn the sampling loop with a fresh timer.
    pub(crate) fn spawn(
        position: Arc<dyn PositionSource>,
        profile: Arc<dyn UserProfile>,
        sink: FrameSink,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run_loop(position, profile, sink, interval, shutdown_rx));
        Self {
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Cancel the timer. Idempotent via drop semantics.
    pub(crate) fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn run_loop(
    position: Arc<dyn PositionSource>,
    profile: Arc<dyn UserProfile>,
    sink: FrameSink,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // The watch stream, when offered, is registered once for the lifetime
    // of this loop; its latest value feeds the next tick.
    let watch_rx = position.watch_fixes();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    log::debug!("[Telemetry] Started ({}s cadence)", interval.as_secs_f32());

    loop {
        tokio::select! {
            // Completes on explicit stop and when the handle is dropped.
            _ = &mut shutdown_rx => break,

            _ = ticker.tick() => {
                let fix = match freshest_fix(watch_rx.as_ref(), position.as_ref()).await {
                    Ok(fix) => fix,
                    Err(e) => {
                        log::debug!("[Telemetry] No fix this tick: {e:#}");
                        continue;
                    }
                };

                let sample = LocationSample {
                    lat: fix.lat,
                    lon: fix.lon,
                    accuracy_m: fix.accuracy_m,
                    status: profile.safety_status(),
                    captured_at_ms: fix.captured_at_ms,
                };
                let snapshot = ProfileSnapshot::capture(profile.as_ref());

                match outbound::location_frame(&sample, &snapshot) {
                    Ok(frame) => {
                        if let Err(e) = sink.send(frame) {
                            // Disconnect races are expected; the runtime is
                            // already stopping this loop.
                            log::debug!("[Telemetry] Send skipped: {e}");
                        }
                    }
                    Err(e) => log::warn!("[Telemetry] Sample rejected: {e}"),
                }
            }
        }
    }

    log::debug!("[Telemetry] Stopped");
}

/// The freshest available fix: the watch stream's latest value when one is
/// present, otherwise a single on-demand call.
async fn freshest_fix(
    watch_rx: Option<&watch::Receiver<Option<PositionFix>>>,
    position: &dyn PositionSource,
) -> anyhow::Result<PositionFix> {
    if let Some(rx) = watch_rx {
        if let Some(fix) = *rx.borrow() {
            return Ok(fix);
        }
    }
    position.current_fix().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Command;
    use crate::messages::SafetyStatus;
    use crate::outbound::TYPE_LOCATION;
    use crate::position::FixedPositionSource;
    use crate::profile::StaticProfile;
    use crate::types::{ConnectionState, SharedState};
    use async_trait::async_trait;

    /// Source with a watch stream but no on-demand capability.
    struct WatchOnlySource {
        tx: watch::Sender<Option<PositionFix>>,
    }

    #[async_trait]
    impl PositionSource for WatchOnlySource {
        async fn current_fix(&self) -> anyhow::Result<PositionFix> {
            anyhow::bail!("on-demand fixes unavailable")
        }

        fn watch_fixes(&self) -> Option<watch::Receiver<Option<PositionFix>>> {
            Some(self.tx.subscribe())
        }
    }

    fn fix(lat: f64) -> PositionFix {
        PositionFix {
            lat,
            lon: 106.7,
            accuracy_m: 5.0,
            captured_at_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_freshest_fix_prefers_watch_value() {
        let (tx, _keep) = watch::channel(Some(fix(10.1)));
        let source = WatchOnlySource { tx };
        let rx = source.watch_fixes();
        let got = freshest_fix(rx.as_ref(), &source).await.expect("watch value");
        assert!((got.lat - 10.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_freshest_fix_falls_back_to_on_demand() {
        let source = FixedPositionSource::new(10.9, 106.6, 3.0);
        let got = freshest_fix(None, &source).await.expect("on-demand fix");
        assert!((got.lat - 10.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_freshest_fix_empty_watch_surfaces_source_error() {
        let (tx, _keep) = watch::channel(None);
        let source = WatchOnlySource { tx };
        let rx = source.watch_fixes();
        assert!(freshest_fix(rx.as_ref(), &source).await.is_err());
    }

    #[tokio::test]
    async fn test_loop_emits_location_frames_while_connected() {
        let state = SharedState::new();
        state.set(ConnectionState::Connected);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = FrameSink {
            state: Arc::clone(&state),
            tx: tx.downgrade(),
        };

        let profile = Arc::new(
            StaticProfile::new("Lan", "+84901234567").with_status(SafetyStatus::Caution),
        );
        let task = TelemetryTask::spawn(
            Arc::new(FixedPositionSource::new(10.762, 106.66, 4.0)),
            profile,
            sink,
            Duration::from_millis(20),
        );

        let cmd = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("tick within timeout")
            .expect("command delivered");
        let Command::Send { frame } = cmd else {
            panic!("expected a send command");
        };
        assert_eq!(frame.header("type"), Some(TYPE_LOCATION));
        let value: serde_json::Value = serde_json::from_str(&frame.body).expect("json body");
        assert_eq!(value["Status"], "CAUTION");
        assert_eq!(value["Username"], "Lan");

        task.stop();
    }

    #[tokio::test]
    async fn test_stop_cancels_the_timer() {
        let state = SharedState::new();
        state.set(ConnectionState::Connected);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = FrameSink {
            state: Arc::clone(&state),
            tx: tx.downgrade(),
        };

        let task = TelemetryTask::spawn(
            Arc::new(FixedPositionSource::new(0.0, 0.0, 1.0)),
            Arc::new(StaticProfile::new("T", "+1")),
            sink,
            Duration::from_millis(10),
        );
        task.stop();

        // Drain whatever landed before the stop, then confirm silence.
        tokio::time::sleep(Duration::from_millis(50)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
