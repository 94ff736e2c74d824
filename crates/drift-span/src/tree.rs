//! Run trace builder.
//!
//! Collects stage spans under a run span and derives the run status from
//! them when the run finishes.

use crate::span::{SpanStatus, TraceSpan};
use uuid::Uuid;

/// Builder for one run's trace.
pub struct RunTraceBuilder {
    run_span: TraceSpan,
    stages: Vec<TraceSpan>,
}

impl RunTraceBuilder {
    /// Create a builder whose run span uses `trace_id` (the request id).
    pub fn new(trace_id: Uuid, run_name: &str) -> Self {
        Self {
            run_span: TraceSpan::new_run(trace_id, run_name),
            stages: Vec::new(),
        }
    }

    /// Open a stage span parented to the run span.
    pub fn start_stage(&self, stage: &str) -> TraceSpan {
        TraceSpan::new_stage(self.run_span.trace_id, self.run_span.span_id, stage)
    }

    /// Record a stage span. Spans still running are closed as completed.
    pub fn record(&mut self, mut span: TraceSpan) {
        if !span.status.is_terminal() {
            span.complete();
        }
        self.stages.push(span);
    }

    /// Set an attribute on the run span.
    pub fn set_run_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.run_span.set_attribute(key, value);
    }

    /// Name of the first failed stage, if any.
    pub fn failed_stage(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| s.status == SpanStatus::Failed)
            .map(|s| s.name.as_str())
    }

    /// Names of recorded stages in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Finalize the trace.
    ///
    /// - No stages recorded: the run span is failed.
    /// - Any stage failed: the run span is failed and names that stage.
    /// - Otherwise the run span is completed.
    pub fn finalize(mut self) -> TraceSpan {
        if self.stages.is_empty() {
            self.run_span.fail("no stages recorded");
        } else if let Some(stage) = self.failed_stage().map(str::to_string) {
            self.run_span.fail(format!("stage '{}' failed", stage));
        } else {
            self.run_span.complete();
        }

        self.run_span.children = self.stages;
        self.run_span
    }
}
