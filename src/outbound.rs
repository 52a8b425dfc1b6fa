//! Outbound frame builders.
//!
//! Each builder validates its required fields first and fails fast with
//! [`TransportError::Validation`] — a contract check, not a network error,
//! so nothing reaches the socket on failure. On success the typed payload
//! is serialized to JSON and wrapped in a SEND frame whose `type` header
//! names the domain (`location`, `report`, `alert`).

// Rust guideline compliant 2026-02

use serde::Serialize;

use crate::constants::{DEFAULT_ALERT_RADIUS_M, DEFAULT_ALERT_TTL_MIN};
use crate::frame::{Frame, FrameCommand};
use crate::messages::{AlertRequest, LocationSample, ReportDraft, SafetyStatus};
use crate::profile::ProfileSnapshot;
use crate::types::TransportError;

/// `type` header value for location telemetry frames.
pub const TYPE_LOCATION: &str = "location";
/// `type` header value for hazard report frames.
pub const TYPE_REPORT: &str = "report";
/// `type` header value for alert frames.
pub const TYPE_ALERT: &str = "alert";

/// Location telemetry payload. Field casing is fixed by the server's
/// tracker endpoint and predates this client.
#[derive(Debug, Serialize)]
struct LocationPayload<'a> {
    #[serde(rename = "Lat")]
    lat: f64,
    #[serde(rename = "Lon")]
    lon: f64,
    #[serde(rename = "AccuracyM")]
    accuracy_m: f64,
    #[serde(rename = "Status")]
    status: SafetyStatus,
    #[serde(rename = "UpdatedAt")]
    updated_at: i64,
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Phone")]
    phone: &'a str,
}

/// Hazard report payload.
#[derive(Debug, Serialize)]
struct ReportPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    detail: &'a str,
    description: &'a str,
    image: Option<&'a str>,
    lat: f64,
    lon: f64,
    user_name: &'a str,
    phone_number: &'a str,
    timestamp: i64,
}

/// Alert raise payload.
#[derive(Debug, Serialize)]
struct AlertRaisePayload<'a> {
    action: &'static str,
    body: &'a str,
    lat: f64,
    lon: f64,
    radius_m: u32,
    ttl_min: u32,
    user_name: &'a str,
    phone_number: &'a str,
}

/// Alert resolve payload.
#[derive(Debug, Serialize)]
struct AlertResolvePayload<'a> {
    action: &'static str,
    #[serde(rename = "alertId")]
    alert_id: &'a str,
}

fn require(ok: bool, msg: &str) -> Result<(), TransportError> {
    if ok {
        Ok(())
    } else {
        Err(TransportError::Validation(msg.to_string()))
    }
}

fn require_coords(lat: f64, lon: f64, what: &str) -> Result<(), TransportError> {
    require(
        lat.is_finite() && lon.is_finite(),
        &format!("{what} requires finite lat/lon"),
    )
}

fn send_frame(kind: &'static str, body: String) -> Frame {
    Frame::new(FrameCommand::Send)
        .with_header("type", kind)
        .with_header("content-type", "application/json")
        .with_body(body)
}

/// Build a location telemetry SEND frame from a sample plus the caller's
/// profile snapshot. The sample is read, merged, and forgotten — never
/// mutated or retained.
///
/// # Errors
///
/// Fails validation on non-finite coordinates or negative accuracy.
pub fn location_frame(
    sample: &LocationSample,
    profile: &ProfileSnapshot,
) -> Result<Frame, TransportError> {
    require_coords(sample.lat, sample.lon, "location")?;
    require(
        sample.accuracy_m.is_finite() && sample.accuracy_m >= 0.0,
        "location requires non-negative accuracy",
    )?;

    let payload = LocationPayload {
        lat: sample.lat,
        lon: sample.lon,
        accuracy_m: sample.accuracy_m,
        status: sample.status,
        updated_at: sample.captured_at_ms,
        username: &profile.display_name,
        phone: &profile.phone_number,
    };
    let body = serde_json::to_string(&payload).expect("serializable");
    Ok(send_frame(TYPE_LOCATION, body))
}

/// Build a hazard report SEND frame.
///
/// # Errors
///
/// Fails validation when kind, detail, or description is blank, or when
/// coordinates are non-finite. `image` is optional.
pub fn report_frame(
    draft: &ReportDraft,
    profile: &ProfileSnapshot,
) -> Result<Frame, TransportError> {
    require(!draft.kind.trim().is_empty(), "report requires type")?;
    require(!draft.detail.trim().is_empty(), "report requires detail")?;
    require(
        !draft.description.trim().is_empty(),
        "report requires description",
    )?;
    require_coords(draft.lat, draft.lon, "report")?;

    let payload = ReportPayload {
        kind: &draft.kind,
        detail: &draft.detail,
        description: &draft.description,
        image: draft.image.as_deref(),
        lat: draft.lat,
        lon: draft.lon,
        user_name: &profile.display_name,
        phone_number: &profile.phone_number,
        timestamp: draft.captured_at_ms,
    };
    let body = serde_json::to_string(&payload).expect("serializable");
    Ok(send_frame(TYPE_REPORT, body))
}

/// Build an alert SEND frame for a raise or resolve action.
///
/// Raise requires body and coordinates, with radius/TTL defaulted when
/// absent; resolve requires only the alert id.
///
/// # Errors
///
/// Fails validation when the required fields for the action are missing.
pub fn alert_frame(
    request: &AlertRequest,
    profile: &ProfileSnapshot,
) -> Result<Frame, TransportError> {
    let body = match request {
        AlertRequest::Raise(raise) => {
            require(!raise.body.trim().is_empty(), "alert raise requires body")?;
            require_coords(raise.lat, raise.lon, "alert raise")?;
            let payload = AlertRaisePayload {
                action: "raise",
                body: &raise.body,
                lat: raise.lat,
                lon: raise.lon,
                radius_m: raise.radius_m.unwrap_or(DEFAULT_ALERT_RADIUS_M),
                ttl_min: raise.ttl_min.unwrap_or(DEFAULT_ALERT_TTL_MIN),
                user_name: &profile.display_name,
                phone_number: &profile.phone_number,
            };
            serde_json::to_string(&payload).expect("serializable")
        }
        AlertRequest::Resolve { alert_id } => {
            require(
                !alert_id.trim().is_empty(),
                "alert resolve requires alertId",
            )?;
            let payload = AlertResolvePayload {
                action: "resolve",
                alert_id,
            };
            serde_json::to_string(&payload).expect("serializable")
        }
    };
    Ok(send_frame(TYPE_ALERT, body))
}
