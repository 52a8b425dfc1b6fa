//! Inbound broadcast router.
//!
//! MESSAGE frames carry JSON payloads that have been produced by several
//! generations of server code, with several spellings for the same logical
//! field. The router classifies each payload (alert, report, or unknown),
//! normalizes it through prioritized field-name lists into one canonical
//! record, then dispatches it on its own task: the analyzer collaborator
//! is awaited and the registered handler receives the record plus the
//! optional assessment. Dispatch is independent per message — two
//! broadcasts may have their analysis calls in flight concurrently, with
//! no ordering guarantee on completion.
//!
//! Malformed bodies are logged and dropped; nothing here can take the
//! connection down.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use serde_json::Value;

use crate::analysis::{HazardAnalyzer, HazardAssessment};
use crate::frame::Frame;
use crate::messages::{AlertBroadcast, ReportBroadcast};
use crate::outbound::{TYPE_ALERT, TYPE_REPORT};

/// Normalized alert broadcast plus its analysis outcome.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// The normalized alert record.
    pub alert: AlertBroadcast,
    /// Analyzer result; `None` when no analyzer is registered or it failed.
    pub assessment: Option<HazardAssessment>,
}

/// Normalized report broadcast plus its analysis outcome.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    /// The normalized report record.
    pub report: ReportBroadcast,
    /// Analyzer result; `None` when no analyzer is registered or it failed.
    pub assessment: Option<HazardAssessment>,
}

/// Callback receiving inbound alert events.
pub type AlertHandler = Arc<dyn Fn(AlertEvent) + Send + Sync>;
/// Callback receiving inbound report events.
pub type ReportHandler = Arc<dyn Fn(ReportEvent) + Send + Sync>;

/// Router holding the registered handlers and the analyzer seam.
pub(crate) struct InboundRouter {
    pub(crate) alert_handler: Option<AlertHandler>,
    pub(crate) report_handler: Option<ReportHandler>,
    pub(crate) analyzer: Option<Arc<dyn HazardAnalyzer>>,
}

impl std::fmt::Debug for InboundRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRouter")
            .field("alert_handler", &self.alert_handler.is_some())
            .field("report_handler", &self.report_handler.is_some())
            .field("analyzer", &self.analyzer.is_some())
            .finish()
    }
}

impl InboundRouter {
    /// Dispatch one MESSAGE frame on its own task.
    pub(crate) fn dispatch(self: &Arc<Self>, frame: Frame) {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            router.route(frame).await;
        });
    }

    async fn route(&self, frame: Frame) {
        let type_header = frame.header("type").map(str::to_string);
        let body: Value = match serde_json::from_str(&frame.body) {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "[Inbound] Dropping MESSAGE with unparseable body: {} ({})",
                    e,
                    &frame.body[..frame.body.len().min(120)]
                );
                return;
            }
        };

        match classify(type_header.as_deref(), &body) {
            MessageKind::Alert => {
                let alert = normalize_alert(&body);
                let Some(handler) = &self.alert_handler else {
                    log::debug!("[Inbound] Alert broadcast with no handler registered");
                    return;
                };
                let assessment = match &self.analyzer {
                    Some(analyzer) => match analyzer.analyze_alert(&alert).await {
                        Ok(assessment) => Some(assessment),
                        Err(e) => {
                            log::warn!("[Inbound] Alert analysis failed: {e:#}");
                            None
                        }
                    },
                    None => None,
                };
                handler(AlertEvent { alert, assessment });
            }
            MessageKind::Report => {
                let report = normalize_report(&body);
                let Some(handler) = &self.report_handler else {
                    log::debug!("[Inbound] Report broadcast with no handler registered");
                    return;
                };
                let assessment = match &self.analyzer {
                    Some(analyzer) => match analyzer.analyze_report(&report).await {
                        Ok(assessment) => Some(assessment),
                        Err(e) => {
                            log::warn!("[Inbound] Report analysis failed: {e:#}");
                            None
                        }
                    },
                    None => None,
                };
                handler(ReportEvent { report, assessment });
            }
            MessageKind::Unknown => {
                log::debug!(
                    "[Inbound] Dropping unclassifiable broadcast (type header: {:?})",
                    type_header
                );
            }
        }
    }
}

/// Classification of an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    /// Alert broadcast.
    Alert,
    /// Report broadcast.
    Report,
    /// Neither; logged and dropped.
    Unknown,
}

/// Classify a payload by field sniffing.
///
/// Alerts win ties: a payload carrying an alert-identifier spelling (or an
/// explicit alert type) is an alert even if it also has a bare `id`. A bare
/// `id` without alert markers classifies as a report — that is the report
/// identifier the server has always used.
pub(crate) fn classify(type_header: Option<&str>, body: &Value) -> MessageKind {
    let type_field = body.get("type").and_then(Value::as_str);
    let declared = type_header.or(type_field);

    let has_alert_id = body.get("alertId").is_some() || body.get("alert_id").is_some();
    if has_alert_id || declared.is_some_and(|t| t.eq_ignore_ascii_case(TYPE_ALERT)) {
        return MessageKind::Alert;
    }

    let has_report_id = body.get("id").is_some()
        || body.get("reportId").is_some()
        || body.get("report_id").is_some();
    if has_report_id || declared.is_some_and(|t| t.eq_ignore_ascii_case(TYPE_REPORT)) {
        return MessageKind::Report;
    }

    MessageKind::Unknown
}

/// First string value found under any of the given keys.
fn pick_str(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| body.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// First numeric value found under any of the given keys.
///
/// Legacy payloads sometimes carry numbers as strings; both forms are
/// accepted.
fn pick_f64(body: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let value = body.get(key)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    })
}

fn pick_u32(body: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| {
        let value = body.get(key)?;
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    })
}

fn pick_i64(body: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| {
        let value = body.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    })
}

/// Normalize an alert payload, whichever field generation produced it.
pub(crate) fn normalize_alert(body: &Value) -> AlertBroadcast {
    AlertBroadcast {
        alert_id: pick_str(body, &["alertId", "alert_id", "id"]),
        body: pick_str(body, &["body", "Body", "message", "content"]),
        lat: pick_f64(body, &["lat", "Lat", "latitude"]),
        lon: pick_f64(body, &["lon", "Lon", "lng", "longitude"]),
        radius_m: pick_u32(body, &["radius_m", "radiusMeters", "radius"]),
        ttl_min: pick_u32(body, &["ttl_min", "ttlMinutes", "ttl"]),
        status: pick_str(body, &["status", "Status"]),
        user_name: pick_str(body, &["user_name", "userName", "username", "Username"]),
        phone_number: pick_str(body, &["phone_number", "phoneNumber", "phone", "Phone"]),
    }
}

/// Normalize a report payload, whichever field generation produced it.
pub(crate) fn normalize_report(body: &Value) -> ReportBroadcast {
    ReportBroadcast {
        report_id: pick_str(body, &["id", "reportId", "report_id"]),
        kind: pick_str(body, &["type", "reportType"]),
        detail: pick_str(body, &["detail", "Detail"]),
        description: pick_str(body, &["description", "Description", "desc"]),
        image: pick_str(body, &["image", "imageUrl", "image_url", "photo"]),
        lat: pick_f64(body, &["lat", "Lat", "latitude"]),
        lon: pick_f64(body, &["lon", "Lon", "lng", "longitude"]),
        user_name: pick_str(body, &["user_name", "userName", "username", "Username"]),
        phone_number: pick_str(body, &["phone_number", "phoneNumber", "phone", "Phone"]),
        timestamp: pick_i64(body, &["timestamp", "capturedAtMs", "created_at"]),
    }
}
