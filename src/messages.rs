//! Domain records carried over the realtime transport.
//!
//! Outbound types ([`LocationSample`], [`ReportDraft`], [`AlertRequest`])
//! are what call sites hand to the builders; inbound types
//! ([`AlertBroadcast`], [`ReportBroadcast`]) are the canonical records the
//! router normalizes server broadcasts into, whatever legacy field names
//! the broadcast used.

use serde::{Deserialize, Serialize};

/// The user's self-declared safety status, attached to every telemetry
/// sample and rendered on the family-tracker map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyStatus {
    /// User reported safe.
    Safe,
    /// User reported a worsening situation.
    Caution,
    /// User reported immediate danger.
    Danger,
    /// No status reported yet.
    #[default]
    Unknown,
}

impl std::fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Caution => write!(f, "CAUTION"),
            Self::Danger => write!(f, "DANGER"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One position sample, composed per telemetry tick from the position
/// source's fix plus the profile accessor's current status. Consumed by the
/// location builder and never retained after send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Horizontal accuracy radius in meters; never negative.
    pub accuracy_m: f64,
    /// Safety status at capture time.
    pub status: SafetyStatus,
    /// Capture time, epoch milliseconds.
    pub captured_at_ms: i64,
}

/// A hazard report as composed by the report form.
///
/// Fire-and-forget: the server assigns report identity, so the draft
/// carries none.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDraft {
    /// Hazard category (e.g. "FLOOD", "LANDSLIDE").
    pub kind: String,
    /// Short machine-oriented detail code.
    pub detail: String,
    /// Free-text description.
    pub description: String,
    /// Optional photo URL.
    pub image: Option<String>,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Capture time, epoch milliseconds.
    pub captured_at_ms: i64,
}

/// An alert action issued by the SOS panel.
///
/// The server owns the authoritative alert record and its RAISED → SOLVED
/// transitions; the client only raises and resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertRequest {
    /// Raise a new alert around the given position.
    Raise(AlertRaise),
    /// Resolve a previously raised alert by id.
    Resolve {
        /// Server-assigned alert identifier.
        alert_id: String,
    },
}

/// Payload of an alert raise.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRaise {
    /// Free-text alert message.
    pub body: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Broadcast radius in meters; defaulted when absent.
    pub radius_m: Option<u32>,
    /// Time-to-live in minutes; defaulted when absent.
    pub ttl_min: Option<u32>,
}

/// Canonical form of an inbound alert broadcast.
///
/// Every field is optional: classification only guarantees the frame *is*
/// an alert, not which of the historical field spellings it carried.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertBroadcast {
    /// Server-assigned alert identifier.
    pub alert_id: Option<String>,
    /// Free-text alert message.
    pub body: Option<String>,
    /// Latitude in decimal degrees.
    pub lat: Option<f64>,
    /// Longitude in decimal degrees.
    pub lon: Option<f64>,
    /// Broadcast radius in meters.
    pub radius_m: Option<u32>,
    /// Time-to-live in minutes.
    pub ttl_min: Option<u32>,
    /// Server-side status (RAISED, SOLVED).
    pub status: Option<String>,
    /// Display name of the raising user.
    pub user_name: Option<String>,
    /// Phone number of the raising user.
    pub phone_number: Option<String>,
}

/// Canonical form of an inbound report broadcast.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportBroadcast {
    /// Server-assigned report identifier.
    pub report_id: Option<String>,
    /// Hazard category.
    pub kind: Option<String>,
    /// Short machine-oriented detail code.
    pub detail: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Photo URL.
    pub image: Option<String>,
    /// Latitude in decimal degrees.
    pub lat: Option<f64>,
    /// Longitude in decimal degrees.
    pub lon: Option<f64>,
    /// Display name of the reporting user.
    pub user_name: Option<String>,
    /// Phone number of the reporting user.
    pub phone_number: Option<String>,
    /// Capture time, epoch milliseconds.
    pub timestamp: Option<i64>,
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&SafetyStatus::Caution).expect("serializable"),
            "\"CAUTION\""
        );
        let parsed: SafetyStatus =
            serde_json::from_str("\"DANGER\"").expect("deserializable");
        assert_eq!(parsed, SafetyStatus::Danger);
    }

    #[test]
    fn test_safety_status_defaults_unknown() {
        assert_eq!(SafetyStatus::default(), SafetyStatus::Unknown);
    }

    #[test]
    fn test_epoch_ms_is_recent() {
        // Sanity: after 2020-01-01 and not absurdly far in the future.
        let now = epoch_ms();
        assert!(now > 1_577_836_800_000);
        assert!(now < 4_102_444_800_000);
    }
}
