//! Schema Drift Agent Contracts
//!
//! Request/response types for the drift detection boundary plus the domain
//! value objects shared by the lineage store, engine and orchestrator.

mod remediation;
mod report;
mod schemas;

pub use remediation::*;
pub use report::*;
pub use schemas::*;

use drift_span::TraceSpan;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input for one drift detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectDriftRequest {
    /// Pipeline to evaluate
    pub pipeline_id: String,

    /// Idempotency key; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    /// Requester identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl DetectDriftRequest {
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            request_id: None,
            requested_by: None,
        }
    }

    /// Pin the request id
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Terminal decision of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// No drift, or non-breaking drift
    Continue,
    /// Breaking drift healed (applied or queued) under a `patch` policy
    AutoHeal,
    /// A human must act
    ManualReview,
    /// Pipeline must not run until cleared
    Pause,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::AutoHeal => "auto_heal",
            Self::ManualReview => "manual_review",
            Self::Pause => "pause",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the decision state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Start,
    Identified,
    Crawled,
    Persisted,
    Detected,
    Healed,
    SkippedHealing,
    Notified,
    SkippedNotification,
    Decided,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Identified => "identified",
            Self::Crawled => "crawled",
            Self::Persisted => "persisted",
            Self::Detected => "detected",
            Self::Healed => "healed",
            Self::SkippedHealing => "skipped_healing",
            Self::Notified => "notified",
            Self::SkippedNotification => "skipped_notification",
            Self::Decided => "decided",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Decided)
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run was aborted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stage the error originated in
    pub stage: RunStage,

    /// Error category (`collaborator_timeout`, `cancelled`, ...)
    pub kind: String,

    /// Error message
    pub cause: String,
}

/// Everything a run produced besides the headline decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetails {
    /// One report per crawled source component
    pub reports: Vec<DriftReport>,

    /// Pipelines that consume or produce any compared component
    #[serde(default)]
    pub impacted_pipelines: Vec<String>,

    /// Optional semantic explanation of the drift
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    /// Healing stage result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healing: Option<HealingOutcome>,

    /// Notification stage result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationOutcome>,

    /// Set when the run was aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,

    /// Stage-by-stage execution trace
    pub trace: TraceSpan,
}

/// Output of one drift detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectDriftResponse {
    /// Request id (idempotency key)
    pub request_id: Uuid,

    /// Evaluated pipeline
    pub pipeline_id: String,

    /// Terminal decision
    pub decision: Decision,

    /// Aggregate severity over all compared components
    pub severity: Severity,

    /// Whether any drift was found
    pub drift: bool,

    /// Whether any drift was breaking
    pub breaking: bool,

    /// Run details
    pub details: RunDetails,
}

impl DetectDriftResponse {
    /// Get summary for logging
    pub fn summary(&self) -> String {
        format!(
            "[{}] pipeline={} decision={} severity={} drift={} breaking={}",
            self.request_id,
            self.pipeline_id,
            self.decision,
            self.severity,
            self.drift,
            self.breaking,
        )
    }
}
