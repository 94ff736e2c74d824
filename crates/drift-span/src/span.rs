//! Core span types.
//!
//! Defines `TraceSpan`, `SpanKind` and `SpanStatus` used to build the
//! two-level run/stage trace of an orchestration run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Completed,
    Skipped,
    Failed,
}

impl SpanStatus {
    /// Whether the span has been closed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SpanStatus::Running)
    }
}

/// Level of a span in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Run,
    Stage,
}

/// A single span of a run trace.
///
/// Spans are closed exactly once; closing an already closed span is a no-op
/// so a stage can never flip from `failed` back to `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub span_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
    /// Shared by every span of one run (the request id).
    pub trace_id: Uuid,
    pub kind: SpanKind,
    pub status: SpanStatus,
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TraceSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceSpan {
    /// Create a run-level span.
    pub fn new_run(trace_id: Uuid, name: &str) -> Self {
        Self::open(trace_id, None, SpanKind::Run, name)
    }

    /// Create a stage-level span parented to `parent_span_id`.
    pub fn new_stage(trace_id: Uuid, parent_span_id: Uuid, stage: &str) -> Self {
        Self::open(trace_id, Some(parent_span_id), SpanKind::Stage, stage)
    }

    fn open(trace_id: Uuid, parent_span_id: Option<Uuid>, kind: SpanKind, name: &str) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            parent_span_id,
            trace_id,
            kind,
            status: SpanStatus::Running,
            name: name.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            error: None,
        }
    }

    /// Set an attribute on the span.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Builder form of [`TraceSpan::set_attribute`].
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Mark the span as completed.
    pub fn complete(&mut self) {
        self.close(SpanStatus::Completed);
    }

    /// Mark the span as skipped, recording why.
    pub fn skip(&mut self, reason: impl Into<String>) {
        if self.close(SpanStatus::Skipped) {
            self.set_attribute("skip_reason", serde_json::Value::String(reason.into()));
        }
    }

    /// Mark the span as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.close(SpanStatus::Failed) {
            self.error = Some(error.into());
        }
    }

    /// Add a child span.
    pub fn add_child(&mut self, child: TraceSpan) {
        self.children.push(child);
    }

    fn close(&mut self, status: SpanStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = status;
        self.ended_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_span() {
        let trace_id = Uuid::new_v4();
        let span = TraceSpan::new_run(trace_id, "orders-etl");

        assert_eq!(span.kind, SpanKind::Run);
        assert_eq!(span.status, SpanStatus::Running);
        assert_eq!(span.trace_id, trace_id);
        assert!(span.parent_span_id.is_none());
    }

    #[test]
    fn test_stage_span_is_parented() {
        let run = TraceSpan::new_run(Uuid::new_v4(), "orders-etl");
        let stage = TraceSpan::new_stage(run.trace_id, run.span_id, "crawled");

        assert_eq!(stage.kind, SpanKind::Stage);
        assert_eq!(stage.parent_span_id, Some(run.span_id));
        assert_eq!(stage.trace_id, run.trace_id);
    }

    #[test]
    fn test_skip_records_reason() {
        let mut span = TraceSpan::new_stage(Uuid::new_v4(), Uuid::new_v4(), "skipped_healing");
        span.skip("drift is not breaking");

        assert_eq!(span.status, SpanStatus::Skipped);
        assert_eq!(
            span.attributes.get("skip_reason"),
            Some(&serde_json::json!("drift is not breaking"))
        );
        assert!(span.duration_ms.is_some());
    }

    #[test]
    fn test_closed_span_does_not_reopen() {
        let mut span = TraceSpan::new_stage(Uuid::new_v4(), Uuid::new_v4(), "notified");
        span.fail("channel unreachable");
        span.complete();

        assert_eq!(span.status, SpanStatus::Failed);
        assert_eq!(span.error.as_deref(), Some("channel unreachable"));
    }

    #[test]
    fn test_json_shape() {
        let mut run = TraceSpan::new_run(Uuid::new_v4(), "orders-etl");
        let mut child = TraceSpan::new_stage(run.trace_id, run.span_id, "detected")
            .with_attribute("changes", serde_json::json!(2));
        child.complete();
        run.add_child(child);
        run.complete();

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["kind"], "run");
        assert_eq!(json["children"][0]["name"], "detected");
        assert_eq!(json["children"][0]["attributes"]["changes"], 2);
        assert!(json.get("parent_span_id").is_none());
    }
}
