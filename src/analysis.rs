//! Hazard-analysis seam.
//!
//! Inbound alert and report broadcasts are handed to an injected analyzer
//! as a side effect of dispatch. The transport only calls it and forwards
//! the result to the registered handler — what "analysis" means (an LLM
//! call, a rules engine, nothing at all) is the application's business.

use async_trait::async_trait;

use crate::messages::{AlertBroadcast, ReportBroadcast};

/// Outcome of analyzing one inbound broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HazardAssessment {
    /// Coarse severity label (e.g. "low", "high", "critical").
    pub severity: String,
    /// Human-readable summary for the notification feed.
    pub summary: String,
}

/// Analyzer invoked for inbound alert/report broadcasts.
///
/// Calls for distinct messages may be in flight concurrently; there is no
/// ordering guarantee on completion. A failed analysis is logged and the
/// broadcast is still delivered to the handler, without an assessment.
#[async_trait]
pub trait HazardAnalyzer: Send + Sync {
    /// Analyze an alert broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis backend is unavailable or rejects
    /// the input.
    async fn analyze_alert(&self, alert: &AlertBroadcast) -> anyhow::Result<HazardAssessment>;

    /// Analyze a report broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis backend is unavailable or rejects
    /// the input.
    async fn analyze_report(&self, report: &ReportBroadcast) -> anyhow::Result<HazardAssessment>;
}
