//! User-profile accessor.
//!
//! The location builder stamps every telemetry payload with the user's
//! display name and phone number, and the telemetry scheduler reads the
//! current self-declared safety status here rather than from any ambient
//! storage — the accessor is injected, so tests swap in a static one.

use crate::messages::SafetyStatus;

/// Source of the current user's profile fields.
pub trait UserProfile: Send + Sync {
    /// Display name shown on the family-tracker map.
    fn display_name(&self) -> String;

    /// Contact phone number.
    fn phone_number(&self) -> String;

    /// The user's current self-declared safety status.
    fn safety_status(&self) -> SafetyStatus;
}

/// Point-in-time copy of the profile fields a single outbound payload needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    /// Display name at snapshot time.
    pub display_name: String,
    /// Phone number at snapshot time.
    pub phone_number: String,
}

impl ProfileSnapshot {
    /// Capture the name/phone pair from a profile source.
    #[must_use]
    pub fn capture(profile: &dyn UserProfile) -> Self {
        Self {
            display_name: profile.display_name(),
            phone_number: profile.phone_number(),
        }
    }
}

/// Fixed profile for tests and headless tooling.
#[derive(Debug, Clone)]
pub struct StaticProfile {
    /// Display name to report.
    pub display_name: String,
    /// Phone number to report.
    pub phone_number: String,
    /// Safety status to report.
    pub safety_status: SafetyStatus,
}

impl StaticProfile {
    /// Create a static profile with the given name and phone.
    #[must_use]
    pub fn new(display_name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            phone_number: phone_number.into(),
            safety_status: SafetyStatus::Unknown,
        }
    }

    /// Set the reported safety status.
    #[must_use]
    pub fn with_status(mut self, status: SafetyStatus) -> Self {
        self.safety_status = status;
        self
    }
}

impl UserProfile for StaticProfile {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn phone_number(&self) -> String {
        self.phone_number.clone()
    }

    fn safety_status(&self) -> SafetyStatus {
        self.safety_status
    }
}
