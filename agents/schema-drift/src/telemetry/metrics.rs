//! Prometheus metrics for the Schema Drift Agent
//!
//! - `schema_drift_runs_total` (counter) - Completed runs by decision
//! - `schema_drift_run_duration_seconds` (histogram) - Run duration
//! - `schema_drift_field_changes_total` (counter) - Changes by kind and severity
//! - `schema_drift_stage_failures_total` (counter) - Aborted runs by stage
//! - `schema_drift_snapshot_conflicts_total` (counter) - Lost latest-pointer races

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

use super::{Result, TelemetryError};
use crate::contracts::{Decision, FieldChange};

const NAMESPACE: &str = "schema_drift";

/// Drift metrics for Prometheus
pub struct DriftMetrics {
    registry: Arc<Registry>,
    runs_total: CounterVec,
    run_duration_seconds: HistogramVec,
    field_changes_total: CounterVec,
    stage_failures_total: CounterVec,
    snapshot_conflicts_total: Counter,
}

impl std::fmt::Debug for DriftMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftMetrics").finish_non_exhaustive()
    }
}

impl DriftMetrics {
    /// Create metrics on a private registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create metrics and register them with `registry`
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let runs_total = CounterVec::new(
            Opts::new("runs_total", "Completed drift detection runs by decision").namespace(NAMESPACE),
            &["decision"],
        )?;

        let run_duration_seconds = HistogramVec::new(
            HistogramOpts::new("run_duration_seconds", "Drift detection run duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["decision"],
        )?;

        let field_changes_total = CounterVec::new(
            Opts::new("field_changes_total", "Detected field changes by kind and severity")
                .namespace(NAMESPACE),
            &["kind", "severity"],
        )?;

        let stage_failures_total = CounterVec::new(
            Opts::new("stage_failures_total", "Runs aborted by a failing stage").namespace(NAMESPACE),
            &["stage"],
        )?;

        let snapshot_conflicts_total = Counter::with_opts(
            Opts::new(
                "snapshot_conflicts_total",
                "Snapshot writes that lost the latest-pointer race",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(field_changes_total.clone()))?;
        registry.register(Box::new(stage_failures_total.clone()))?;
        registry.register(Box::new(snapshot_conflicts_total.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            run_duration_seconds,
            field_changes_total,
            stage_failures_total,
            snapshot_conflicts_total,
        })
    }

    /// Record a finished run
    pub fn record_run(&self, decision: Decision, duration_secs: f64) {
        self.runs_total.with_label_values(&[decision.as_str()]).inc();
        self.run_duration_seconds
            .with_label_values(&[decision.as_str()])
            .observe(duration_secs);
    }

    /// Record the changes of one report
    pub fn record_changes(&self, changes: &[FieldChange]) {
        for change in changes {
            self.field_changes_total
                .with_label_values(&[change.kind.as_str(), change.severity.as_str()])
                .inc();
        }
    }

    /// Record an aborted stage
    pub fn record_stage_failure(&self, stage: &str) {
        self.stage_failures_total.with_label_values(&[stage]).inc();
    }

    /// Record a lost latest-pointer race
    pub fn record_snapshot_conflict(&self) {
        self.snapshot_conflicts_total.inc();
    }

    /// Number of recorded runs for a decision
    pub fn runs(&self, decision: Decision) -> u64 {
        self.runs_total.with_label_values(&[decision.as_str()]).get() as u64
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ChangeCategory, ChangeKind, Severity};

    #[test]
    fn test_record_and_encode() {
        let metrics = DriftMetrics::new().unwrap();
        metrics.record_run(Decision::Pause, 0.02);
        metrics.record_run(Decision::Pause, 0.03);
        metrics.record_stage_failure("crawled");
        metrics.record_snapshot_conflict();
        metrics.record_changes(&[FieldChange {
            kind: ChangeKind::Removed,
            category: ChangeCategory::RemovedNullable,
            field: "age".into(),
            previous_field: None,
            old_value: Some("int".into()),
            new_value: None,
            transformation_impacted: false,
            baseline_severity: Severity::Medium,
            severity: Severity::Medium,
            breaking: false,
            rename_candidates: vec![],
        }]);

        assert_eq!(metrics.runs(Decision::Pause), 2);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("schema_drift_runs_total"));
        assert!(text.contains("schema_drift_field_changes_total{kind=\"removed\",severity=\"medium\"} 1"));
        assert!(text.contains("schema_drift_snapshot_conflicts_total 1"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        DriftMetrics::with_registry(Arc::clone(&registry)).unwrap();
        assert!(DriftMetrics::with_registry(registry).is_err());
    }
}
