//! Realtime client: connection lifecycle, reconnection, and the send path.
//!
//! [`RealtimeClient`] is the handle the application holds. It owns no
//! socket itself — a background runtime task does, and it is the only code
//! in the process that touches the transport. The handle reaches it
//! through a command channel, so wire order always equals send order.
//!
//! # Architecture
//!
//! ```text
//!   RealtimeClient                     runtime task
//!       │                                  │
//!       │  connect / close / subscribe     │  owns WsWriter + WsReader
//!       │ ───────────────────────────────► │  Idle → Connecting → Connected → Closed
//!       │  send_location/report/alert      │  linear backoff, capped retries
//!       │  (validated + state-checked,     │  subscription replay on reconnect
//!       │   then queued)                   │  starts/stops TelemetryTask
//!       │                                  ▼
//!       │                           InboundRouter (per-message dispatch)
//! ```
//!
//! # Lifecycle
//!
//! `connect(identity)` resolves on the server's first control frame:
//! CONNECTED completes it, ERROR or a transport failure fails it — and the
//! bounded reconnect policy takes over from there. Messages composed while
//! disconnected are rejected synchronously and never buffered: the caller
//! re-issues them, the library never replays them.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::analysis::HazardAnalyzer;
use crate::constants::{
    HANDSHAKE_TIMEOUT, PROTOCOL_VERSION, RECONNECT_BASE_DELAY, RECONNECT_MAX_RETRIES,
    TELEMETRY_INTERVAL,
};
use crate::frame::{self, Frame, FrameCommand};
use crate::inbound::{AlertEvent, AlertHandler, InboundRouter, ReportEvent, ReportHandler};
use crate::messages::{AlertRequest, LocationSample, ReportDraft};
use crate::outbound;
use crate::position::PositionSource;
use crate::profile::{ProfileSnapshot, UserProfile};
use crate::subscriptions::SubscriptionRegistry;
use crate::telemetry::TelemetryTask;
use crate::types::{ConnectionState, SharedState, TransportError};
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Requests from the handle (and the telemetry loop) to the runtime task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Open (or re-key) the connection and resolve once the handshake
    /// settles.
    Connect {
        /// Opaque user identifier carried in the CONNECT frame.
        identity: String,
        /// Resolved with the handshake outcome.
        done: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Tear the connection down and return to Idle.
    Close {
        /// Acknowledged once the socket is gone.
        done: oneshot::Sender<()>,
    },
    /// Send a SUBSCRIBE frame for a destination already in the registry.
    Subscribe {
        /// Destination to announce.
        destination: String,
    },
    /// Send an UNSUBSCRIBE frame for a destination already removed.
    Unsubscribe {
        /// Destination to cancel.
        destination: String,
    },
    /// Write one pre-built frame.
    Send {
        /// The frame to write.
        frame: Frame,
    },
    /// Toggle the telemetry scheduler.
    SetTelemetry {
        /// Whether the scheduler should run while connected.
        enabled: bool,
    },
}

/// State-checked path into the runtime's send queue.
///
/// Holds a weak sender so a lingering telemetry task can never keep the
/// runtime alive after the client handle is gone.
#[derive(Debug, Clone)]
pub(crate) struct FrameSink {
    pub(crate) state: Arc<SharedState>,
    pub(crate) tx: mpsc::WeakUnboundedSender<Command>,
}

impl FrameSink {
    /// Queue a frame, failing synchronously unless Connected.
    pub(crate) fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let Some(tx) = self.tx.upgrade() else {
            return Err(TransportError::Closed);
        };
        tx.send(Command::Send { frame })
            .map_err(|_| TransportError::Closed)
    }
}

/// Builder for [`RealtimeClient`].
///
/// Collaborators are injected here; timing knobs exist so tests can run
/// many independent clients with short delays.
#[derive(Default)]
pub struct RealtimeClientBuilder {
    endpoint: Option<String>,
    profile: Option<Arc<dyn UserProfile>>,
    position: Option<Arc<dyn PositionSource>>,
    analyzer: Option<Arc<dyn HazardAnalyzer>>,
    alert_handler: Option<AlertHandler>,
    report_handler: Option<ReportHandler>,
    auto_telemetry: Option<bool>,
    telemetry_interval: Option<Duration>,
    reconnect_base_delay: Option<Duration>,
    handshake_timeout: Option<Duration>,
}

impl std::fmt::Debug for RealtimeClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("has_position", &self.position.is_some())
            .field("has_analyzer", &self.analyzer.is_some())
            .finish_non_exhaustive()
    }
}

impl RealtimeClientBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server endpoint (required). `http(s)://` and `ws(s)://`
    /// schemes are accepted; TLS follows the scheme.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the user-profile accessor (required).
    #[must_use]
    pub fn profile(mut self, profile: Arc<dyn UserProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the position source. Without one, telemetry never runs.
    #[must_use]
    pub fn position_source(mut self, position: Arc<dyn PositionSource>) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the analyzer invoked for inbound alert/report broadcasts.
    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn HazardAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Register the inbound alert handler.
    #[must_use]
    pub fn on_alert<F>(mut self, handler: F) -> Self
    where
        F: Fn(AlertEvent) + Send + Sync + 'static,
    {
        self.alert_handler = Some(Arc::new(handler));
        self
    }

    /// Register the inbound report handler.
    #[must_use]
    pub fn on_report<F>(mut self, handler: F) -> Self
    where
        F: Fn(ReportEvent) + Send + Sync + 'static,
    {
        self.report_handler = Some(Arc::new(handler));
        self
    }

    /// Whether telemetry starts automatically on connect (default true).
    #[must_use]
    pub fn auto_telemetry(mut self, enabled: bool) -> Self {
        self.auto_telemetry = Some(enabled);
        self
    }

    /// Override the telemetry sampling interval.
    #[must_use]
    pub fn telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = Some(interval);
        self
    }

    /// Override the linear-backoff base delay.
    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = Some(delay);
        self
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Build the client and spawn its runtime task.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `endpoint` or `profile` is not set.
    #[must_use]
    pub fn build(self) -> RealtimeClient {
        let endpoint = self.endpoint.expect("endpoint is required");
        let profile = self.profile.expect("profile is required");

        let state = SharedState::new();
        let registry = Arc::new(SubscriptionRegistry::new());
        let router = Arc::new(InboundRouter {
            alert_handler: self.alert_handler,
            report_handler: self.report_handler,
            analyzer: self.analyzer,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = ClientRuntime {
            config: RuntimeConfig {
                endpoint,
                telemetry_interval: self.telemetry_interval.unwrap_or(TELEMETRY_INTERVAL),
                reconnect_base_delay: self.reconnect_base_delay.unwrap_or(RECONNECT_BASE_DELAY),
                handshake_timeout: self.handshake_timeout.unwrap_or(HANDSHAKE_TIMEOUT),
            },
            state: Arc::clone(&state),
            registry: Arc::clone(&registry),
            router,
            profile: Arc::clone(&profile),
            position: self.position,
            sink: FrameSink {
                state: Arc::clone(&state),
                tx: tx.downgrade(),
            },
            telemetry_enabled: self.auto_telemetry.unwrap_or(true),
        };
        tokio::spawn(runtime.run(rx));

        RealtimeClient {
            tx,
            state,
            registry,
            profile,
        }
    }
}

/// Handle to the realtime connection.
///
/// Cloning is deliberately not offered: the UI layer owns one client and
/// threads references to it. Dropping the handle shuts the runtime task
/// down, closing any live socket.
pub struct RealtimeClient {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
    registry: Arc<SubscriptionRegistry>,
    profile: Arc<dyn UserProfile>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.state.get())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl RealtimeClient {
    /// Create a client builder.
    #[must_use]
    pub fn builder() -> RealtimeClientBuilder {
        RealtimeClientBuilder::new()
    }

    /// Open the connection as `identity` and wait for the handshake.
    ///
    /// No-op success when already Connected with the same identity; a
    /// different identity replaces the live session. On failure the
    /// bounded reconnect policy keeps retrying in the background.
    ///
    /// # Errors
    ///
    /// Returns the handshake outcome: transport failure, server ERROR
    /// reply, or timeout.
    pub async fn connect(&self, identity: &str) -> Result<(), TransportError> {
        if self.state.is_connected() && self.state.identity().as_deref() == Some(identity) {
            return Ok(());
        }
        let (done, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Connect {
                identity: identity.to_string(),
                done,
            })
            .map_err(|_| TransportError::Closed)?;
        done_rx.await.map_err(|_| TransportError::Closed)?
    }

    /// Close the connection: stop telemetry, drop the socket, return to
    /// Idle. Subscriptions are kept for the next connect.
    pub async fn close(&self) {
        let (done, done_rx) = oneshot::channel();
        if self.tx.send(Command::Close { done }).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Current connection state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Destinations currently registered, in insertion order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.snapshot()
    }

    /// Subscribe to a destination. Idempotent; returns `false` if it was
    /// already registered. The entry persists across disconnects and is
    /// replayed after every reconnect.
    pub fn subscribe(&self, destination: &str) -> bool {
        let added = self.registry.add(destination);
        if added && self.state.is_connected() {
            let _ = self.tx.send(Command::Subscribe {
                destination: destination.to_string(),
            });
        }
        added
    }

    /// Unsubscribe from a destination. Idempotent; returns `false` if it
    /// was not registered. An UNSUBSCRIBE frame goes out only while
    /// Connected — there is nothing live to cancel otherwise.
    pub fn unsubscribe(&self, destination: &str) -> bool {
        let removed = self.registry.remove(destination);
        if removed && self.state.is_connected() {
            let _ = self.tx.send(Command::Unsubscribe {
                destination: destination.to_string(),
            });
        }
        removed
    }

    /// Send one location sample, stamped with the current profile fields.
    ///
    /// # Errors
    ///
    /// Validation failures surface before any connection check; otherwise
    /// fails with [`TransportError::NotConnected`] unless Connected. Never
    /// buffered: a rejected send is the caller's to retry.
    pub fn send_location(&self, sample: &LocationSample) -> Result<(), TransportError> {
        let snapshot = ProfileSnapshot::capture(self.profile.as_ref());
        let frame = outbound::location_frame(sample, &snapshot)?;
        self.enqueue(frame)
    }

    /// Submit a hazard report.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::send_location`].
    pub fn send_report(&self, draft: &ReportDraft) -> Result<(), TransportError> {
        let snapshot = ProfileSnapshot::capture(self.profile.as_ref());
        let frame = outbound::report_frame(draft, &snapshot)?;
        self.enqueue(frame)
    }

    /// Raise or resolve an emergency alert.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::send_location`].
    pub fn send_alert(&self, request: &AlertRequest) -> Result<(), TransportError> {
        let snapshot = ProfileSnapshot::capture(self.profile.as_ref());
        let frame = outbound::alert_frame(request, &snapshot)?;
        self.enqueue(frame)
    }

    /// Stop the telemetry scheduler until resumed (or reconnected with
    /// auto-start enabled).
    pub fn pause_telemetry(&self) {
        let _ = self.tx.send(Command::SetTelemetry { enabled: false });
    }

    /// Resume the telemetry scheduler if a position source is configured.
    pub fn resume_telemetry(&self) {
        let _ = self.tx.send(Command::SetTelemetry { enabled: true });
    }

    fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(Command::Send { frame })
            .map_err(|_| TransportError::Closed)
    }
}

/// Timing and endpoint configuration resolved at build time.
#[derive(Debug)]
struct RuntimeConfig {
    endpoint: String,
    telemetry_interval: Duration,
    reconnect_base_delay: Duration,
    handshake_timeout: Duration,
}

/// The background task owning the socket.
struct ClientRuntime {
    config: RuntimeConfig,
    state: Arc<SharedState>,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<InboundRouter>,
    profile: Arc<dyn UserProfile>,
    position: Option<Arc<dyn PositionSource>>,
    sink: FrameSink,
    telemetry_enabled: bool,
}

/// How a connection cycle ended.
enum CycleEnd {
    /// Back to the idle loop (explicit close or retry budget spent).
    Idle,
    /// The client handle is gone; the runtime exits.
    Shutdown,
}

/// How a live session ended.
enum SessionExit {
    /// Explicit close; acknowledge after teardown.
    Closed(oneshot::Sender<()>),
    /// Re-key to a different identity without touching the retry counter.
    Reconnect {
        identity: String,
        done: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Unexpected loss (socket close/error or server ERROR frame).
    Lost,
    /// The client handle is gone.
    Shutdown,
}

impl ClientRuntime {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            // Idle: nothing live, wait for instructions.
            let Some(cmd) = cmd_rx.recv().await else {
                return;
            };
            match cmd {
                Command::Connect { identity, done } => {
                    if let CycleEnd::Shutdown =
                        self.run_connection(identity, done, &mut cmd_rx).await
                    {
                        return;
                    }
                }
                Command::Close { done } => {
                    // Already idle; close() clears any exhausted-retry state.
                    self.reset_idle();
                    let _ = done.send(());
                }
                Command::SetTelemetry { enabled } => self.telemetry_enabled = enabled,
                Command::Subscribe { .. } | Command::Unsubscribe { .. } => {
                    // Registry is the source of truth; nothing live to tell.
                }
                Command::Send { .. } => {
                    log::debug!("[Realtime] Dropping send while not connected");
                }
            }
        }
    }

    /// One connect call's full lifecycle: handshake, session, bounded
    /// linear-backoff retries, until explicit close, shutdown, or budget
    /// exhaustion.
    async fn run_connection(
        &mut self,
        identity: String,
        done: oneshot::Sender<Result<(), TransportError>>,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> CycleEnd {
        let mut identity = identity;
        let mut pending = Some(done);
        let mut attempt: u32 = 0;
        self.state.set_identity(Some(identity.clone()));

        loop {
            self.state.set(ConnectionState::Connecting);
            log::info!(
                "[Realtime] Connecting to {} as {}",
                self.config.endpoint,
                identity
            );

            let opened = match tokio::time::timeout(
                self.config.handshake_timeout,
                self.open_session(&identity),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::HandshakeTimeout),
            };

            match opened {
                Ok((writer, reader)) => {
                    attempt = 0;
                    self.state.set(ConnectionState::Connected);
                    log::info!("[Realtime] Connected");
                    if let Some(done) = pending.take() {
                        let _ = done.send(Ok(()));
                    }

                    match self.run_session(writer, reader, cmd_rx).await {
                        SessionExit::Closed(done) => {
                            self.reset_idle();
                            let _ = done.send(());
                            return CycleEnd::Idle;
                        }
                        SessionExit::Shutdown => return CycleEnd::Shutdown,
                        SessionExit::Reconnect {
                            identity: new_identity,
                            done,
                        } => {
                            log::info!("[Realtime] Re-keying connection to {new_identity}");
                            identity = new_identity;
                            self.state.set_identity(Some(identity.clone()));
                            pending = Some(done);
                            continue;
                        }
                        SessionExit::Lost => {
                            self.state.set(ConnectionState::Closed);
                        }
                    }
                }
                Err(err) => {
                    log::warn!("[Realtime] Connection attempt failed: {err}");
                    self.state.set(ConnectionState::Closed);
                    if let Some(done) = pending.take() {
                        let _ = done.send(Err(err));
                    }
                }
            }

            // Bounded linear backoff. The attempt counter survives the loop
            // so consecutive failures keep lengthening the delay; it resets
            // on every successful handshake and on every fresh connect().
            if attempt >= RECONNECT_MAX_RETRIES {
                log::warn!(
                    "[Realtime] Retry budget exhausted ({RECONNECT_MAX_RETRIES}); staying closed"
                );
                return CycleEnd::Idle;
            }
            attempt += 1;
            let delay = self.config.reconnect_base_delay * attempt;
            log::info!(
                "[Realtime] Reconnecting in {:.1}s (attempt {attempt}/{RECONNECT_MAX_RETRIES})",
                delay.as_secs_f32()
            );

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => break,
                    cmd = cmd_rx.recv() => match cmd {
                        None => return CycleEnd::Shutdown,
                        Some(Command::Close { done }) => {
                            self.reset_idle();
                            let _ = done.send(());
                            return CycleEnd::Idle;
                        }
                        Some(Command::Connect { identity: new_identity, done }) => {
                            // Fresh connect resets the counter and retries now.
                            attempt = 0;
                            identity = new_identity;
                            self.state.set_identity(Some(identity.clone()));
                            pending = Some(done);
                            break;
                        }
                        Some(Command::SetTelemetry { enabled }) => {
                            self.telemetry_enabled = enabled;
                        }
                        Some(Command::Subscribe { .. } | Command::Unsubscribe { .. }) => {}
                        Some(Command::Send { .. }) => {
                            log::debug!("[Realtime] Dropping send while reconnecting");
                        }
                    }
                }
            }
        }
    }

    /// Open the socket and complete the CONNECT handshake.
    async fn open_session(&self, identity: &str) -> Result<(WsWriter, WsReader), TransportError> {
        let url = ws::ws_endpoint(&self.config.endpoint);
        let (mut writer, mut reader) = ws::connect(&url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{e:#}")))?;

        let connect_frame = Frame::new(FrameCommand::Connect)
            .with_header("version", PROTOCOL_VERSION)
            .with_header("identity", identity);
        write_frame(&mut writer, &connect_frame).await?;

        wait_for_ready(&mut writer, &mut reader).await?;
        Ok((writer, reader))
    }

    /// Drive one connected session until it ends.
    ///
    /// Replays the subscription registry first — inbound broadcasts must
    /// not be silently missed after a reconnect — then starts telemetry
    /// and enters the select loop.
    async fn run_session(
        &mut self,
        mut writer: WsWriter,
        mut reader: WsReader,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionExit {
        for destination in self.registry.snapshot() {
            let subscribe = Frame::new(FrameCommand::Subscribe)
                .with_header("destination", destination.as_str());
            if let Err(e) = write_frame(&mut writer, &subscribe).await {
                log::warn!("[Realtime] Subscription replay failed for {destination}: {e}");
                return SessionExit::Lost;
            }
            log::debug!("[Realtime] Replayed subscription to {destination}");
        }

        let mut telemetry = self.maybe_start_telemetry();

        let exit = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None => break SessionExit::Shutdown,
                    Some(Command::Close { done }) => {
                        let _ = writer.close().await;
                        break SessionExit::Closed(done);
                    }
                    Some(Command::Connect { identity, done }) => {
                        if self.state.identity().as_deref() == Some(identity.as_str()) {
                            let _ = done.send(Ok(()));
                        } else {
                            let _ = writer.close().await;
                            break SessionExit::Reconnect { identity, done };
                        }
                    }
                    Some(Command::Subscribe { destination }) => {
                        let subscribe = Frame::new(FrameCommand::Subscribe)
                            .with_header("destination", destination.as_str());
                        if let Err(e) = write_frame(&mut writer, &subscribe).await {
                            log::warn!("[Realtime] Subscribe to {destination} failed: {e}");
                            break SessionExit::Lost;
                        }
                    }
                    Some(Command::Unsubscribe { destination }) => {
                        let unsubscribe = Frame::new(FrameCommand::Unsubscribe)
                            .with_header("destination", destination.as_str());
                        if let Err(e) = write_frame(&mut writer, &unsubscribe).await {
                            log::warn!("[Realtime] Unsubscribe from {destination} failed: {e}");
                            break SessionExit::Lost;
                        }
                    }
                    Some(Command::Send { frame }) => {
                        if let Err(e) = write_frame(&mut writer, &frame).await {
                            // At-most-once: the frame is gone, the caller
                            // learns through the state change.
                            log::warn!("[Realtime] Send failed: {e}");
                            break SessionExit::Lost;
                        }
                    }
                    Some(Command::SetTelemetry { enabled }) => {
                        self.telemetry_enabled = enabled;
                        if enabled {
                            if telemetry.is_none() {
                                telemetry = self.maybe_start_telemetry();
                            }
                        } else if let Some(task) = telemetry.take() {
                            task.stop();
                        }
                    }
                },

                msg = reader.recv() => match msg {
                    Some(Ok(WsMessage::Text(text))) => match frame::decode(&text) {
                        Ok(frame) => match frame.command {
                            FrameCommand::Message => self.router.dispatch(frame),
                            FrameCommand::Error => {
                                log::error!(
                                    "[Realtime] Server error: {}",
                                    error_detail(&frame)
                                );
                                break SessionExit::Lost;
                            }
                            other => {
                                log::debug!("[Realtime] Ignoring unexpected {other} frame");
                            }
                        },
                        Err(e) => log::warn!("[Realtime] Dropping malformed frame: {e}"),
                    },
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = writer.send_pong(data).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        log::info!("[Realtime] Socket closed by server ({code}: {reason})");
                        break SessionExit::Lost;
                    }
                    Some(Err(e)) => {
                        log::warn!("[Realtime] Socket error: {e:#}");
                        break SessionExit::Lost;
                    }
                    None => {
                        log::info!("[Realtime] Socket stream ended");
                        break SessionExit::Lost;
                    }
                },
            }
        };

        if let Some(task) = telemetry.take() {
            task.stop();
        }
        exit
    }

    fn maybe_start_telemetry(&self) -> Option<TelemetryTask> {
        if !self.telemetry_enabled {
            return None;
        }
        let position = self.position.as_ref()?;
        Some(TelemetryTask::spawn(
            Arc::clone(position),
            Arc::clone(&self.profile),
            self.sink.clone(),
            self.config.telemetry_interval,
        ))
    }

    fn reset_idle(&self) {
        self.state.set(ConnectionState::Idle);
        self.state.set_identity(None);
    }
}

/// Encode and write one frame.
async fn write_frame(writer: &mut WsWriter, frame: &Frame) -> Result<(), TransportError> {
    let wire = frame::encode(frame)?;
    writer
        .send_text(&wire)
        .await
        .map_err(|e| TransportError::SendFailed(format!("{e:#}")))
}

/// Wait for the server's first control frame after CONNECT.
async fn wait_for_ready(
    writer: &mut WsWriter,
    reader: &mut WsReader,
) -> Result<(), TransportError> {
    while let Some(msg) = reader.recv().await {
        match msg {
            Ok(WsMessage::Text(text)) => match frame::decode(&text) {
                Ok(frame) => match frame.command {
                    FrameCommand::Connected => return Ok(()),
                    FrameCommand::Error => {
                        return Err(TransportError::Rejected(error_detail(&frame)));
                    }
                    other => {
                        log::debug!("[Realtime] Ignoring {other} frame before handshake settles");
                    }
                },
                Err(e) => log::warn!("[Realtime] Dropping malformed handshake frame: {e}"),
            },
            Ok(WsMessage::Ping(data)) => {
                let _ = writer.send_pong(data).await;
            }
            Ok(WsMessage::Close { code, reason }) => {
                return Err(TransportError::ConnectionFailed(format!(
                    "closed during handshake ({code}: {reason})"
                )));
            }
            Ok(WsMessage::Pong(_)) => {}
            Err(e) => return Err(TransportError::ConnectionFailed(format!("{e:#}"))),
        }
    }
    Err(TransportError::ConnectionFailed(
        "socket ended during handshake".to_string(),
    ))
}

/// Best human-readable detail an ERROR frame offers.
fn error_detail(frame: &Frame) -> String {
    if let Some(message) = frame.header("message") {
        return message.to_string();
    }
    if frame.body.is_empty() {
        "unspecified".to_string()
    } else {
        frame.body.clone()
    }
}
