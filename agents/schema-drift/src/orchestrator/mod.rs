//! Policy-Driven Decision Orchestrator
//!
//! Drives one detection request through the stage table in [`state`]:
//! identify the pipeline, crawl and persist every source component, detect
//! drift, then heal and notify as the policy demands, and finally decide.
//!
//! Collaborator calls run under the configured timeout. A failure in any
//! stage after identification aborts the run with `manual_review` and the
//! originating stage. Cancellation is checked between stages only.
//! Completed runs are cached by request id, so a resubmission returns the
//! earlier response without touching any collaborator again. The cache
//! keeps the most recent `replay_capacity` request ids.

pub mod healing;
pub mod state;

pub use healing::build_plan;
pub use state::{decide, next_stage, DecisionFacts, Guard, RunFacts, TRANSITIONS};

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use drift_span::{RunTraceBuilder, TraceSpan};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::PipelineCatalog;
use crate::config::{DEFAULT_COLLABORATOR_TIMEOUT_MS, DEFAULT_REPLAY_CAPACITY};
use crate::contracts::*;
use crate::engine::{DriftEngine, Ruleset, TransformationIndex};
use crate::error::{DriftError, Result};
use crate::lineage::LineageStore;
use crate::ports::{CollaboratorResult, ConnectorRegistry, Healer, Notifier, Reasoner};
use crate::telemetry::DriftMetrics;

/// Cooperative cancellation flag, checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type RunCell = Arc<OnceCell<DetectDriftResponse>>;

/// Request id -> run, evicting the oldest id past capacity
#[derive(Default)]
struct ReplayCache {
    cells: HashMap<Uuid, RunCell>,
    order: VecDeque<Uuid>,
}

impl ReplayCache {
    fn cell(&mut self, request_id: Uuid, capacity: usize) -> RunCell {
        if let Some(cell) = self.cells.get(&request_id) {
            return Arc::clone(cell);
        }
        let cell = RunCell::default();
        self.cells.insert(request_id, Arc::clone(&cell));
        self.order.push_back(request_id);
        while self.order.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.cells.remove(&oldest);
                }
                None => break,
            }
        }
        cell
    }

    /// Drop `request_id` if it still maps to `cell`
    fn forget(&mut self, request_id: Uuid, cell: &RunCell) {
        let current = self.cells.get(&request_id).is_some_and(|c| Arc::ptr_eq(c, cell));
        if current {
            self.cells.remove(&request_id);
            self.order.retain(|id| *id != request_id);
        }
    }
}

/// Drift detection orchestrator
pub struct DriftOrchestrator {
    catalog: Arc<dyn PipelineCatalog>,
    lineage: LineageStore,
    engine: DriftEngine,
    connectors: ConnectorRegistry,
    reasoner: Option<Arc<dyn Reasoner>>,
    notifier: Option<Arc<dyn Notifier>>,
    healer: Option<Arc<dyn Healer>>,
    metrics: Option<Arc<DriftMetrics>>,
    timeout: Duration,
    runs: Mutex<ReplayCache>,
    replay_capacity: usize,
}

impl std::fmt::Debug for DriftOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftOrchestrator")
            .field("lineage", &self.lineage)
            .field("connectors", &self.connectors)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one run
struct Run {
    request_id: Uuid,
    pipeline: Pipeline,
    ruleset: Ruleset,
    components: Vec<Component>,
    extracted: Vec<Vec<FieldSpec>>,
    snapshots: Vec<Snapshot>,
    reports: Vec<DriftReport>,
    explanation: Option<String>,
    healing: Option<HealingOutcome>,
    notification: Option<NotificationOutcome>,
}

impl Run {
    fn breaking(&self) -> bool {
        self.reports.iter().any(|r| r.breaking)
    }

    fn severity(&self) -> Severity {
        self.reports.iter().map(|r| r.severity).max().unwrap_or_default()
    }

    fn facts(&self) -> RunFacts {
        RunFacts {
            breaking: self.breaking(),
            auto_heal_allowed: self.pipeline.policy.auto_heal_allowed,
            notify_on_breaking: self.pipeline.policy.notify_on_breaking,
        }
    }
}

impl DriftOrchestrator {
    /// Create an orchestrator with no optional collaborators
    pub fn new(catalog: Arc<dyn PipelineCatalog>, lineage: LineageStore, connectors: ConnectorRegistry) -> Self {
        Self {
            catalog,
            lineage,
            engine: DriftEngine::new(),
            connectors,
            reasoner: None,
            notifier: None,
            healer: None,
            metrics: None,
            timeout: Duration::from_millis(DEFAULT_COLLABORATOR_TIMEOUT_MS),
            runs: Mutex::new(ReplayCache::default()),
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_healer(mut self, healer: Arc<dyn Healer>) -> Self {
        self.healer = Some(healer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DriftMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Per-call collaborator timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of request ids kept for replay
    pub fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity;
        self
    }

    /// Request ids currently held for replay
    pub fn cached_runs(&self) -> usize {
        self.runs.lock().map(|runs| runs.cells.len()).unwrap_or_default()
    }

    pub fn lineage(&self) -> &LineageStore {
        &self.lineage
    }

    /// Run (or replay) one detection request
    pub async fn detect_drift(&self, request: DetectDriftRequest) -> Result<DetectDriftResponse> {
        self.detect_drift_with_cancel(request, &CancellationSignal::new()).await
    }

    /// Run (or replay) one detection request under a cancellation signal
    pub async fn detect_drift_with_cancel(
        &self,
        request: DetectDriftRequest,
        cancel: &CancellationSignal,
    ) -> Result<DetectDriftResponse> {
        let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);
        let cell = {
            let mut runs = self.runs.lock().map_err(DriftError::store)?;
            runs.cell(request_id, self.replay_capacity)
        };

        if let Some(done) = cell.get() {
            debug!(request_id = %request_id, "Replaying completed run");
            return replay(done, &request.pipeline_id);
        }

        let outcome = cell
            .get_or_try_init(|| self.execute(request_id, &request.pipeline_id, cancel))
            .await;

        match outcome {
            Ok(response) => replay(response, &request.pipeline_id),
            Err(e) => {
                // failed lookups are not terminal decisions, let the id be reused
                if let Ok(mut runs) = self.runs.lock() {
                    if cell.get().is_none() {
                        runs.forget(request_id, &cell);
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request_id: Uuid,
        pipeline_id: &str,
        cancel: &CancellationSignal,
    ) -> Result<DetectDriftResponse> {
        let started = Instant::now();
        let mut trace = RunTraceBuilder::new(request_id, "detect_drift");
        trace.set_run_attribute("pipeline_id", json!(pipeline_id));

        let mut span = trace.start_stage(RunStage::Identified.as_str());
        let mut run = self.identify(request_id, pipeline_id)?;
        span.set_attribute("sources", json!(run.pipeline.sources));
        span.set_attribute("ruleset", json!(run.ruleset.id));
        trace.record(span);
        info!(request_id = %request_id, pipeline_id, stage = "identified", "Pipeline identified");

        let mut stage = RunStage::Identified;
        let mut failure = None;
        loop {
            let next = next_stage(stage, &run.facts())?;
            if next.is_terminal() {
                break;
            }

            let mut span = trace.start_stage(next.as_str());
            if cancel.is_cancelled() {
                span.fail("cancelled");
                trace.record(span);
                failure = Some(self.abort(request_id, next, &DriftError::Cancelled));
                break;
            }

            match self.run_stage(next, &mut run, &mut span).await {
                Ok(()) => {
                    trace.record(span);
                    debug!(request_id = %request_id, stage = next.as_str(), "Stage finished");
                }
                Err(e) => {
                    span.fail(e.to_string());
                    trace.record(span);
                    failure = Some(self.abort(request_id, next, &e));
                    break;
                }
            }
            stage = next;
        }

        let notification_failed = run
            .notification
            .as_ref()
            .map(|n| !n.all_delivered())
            .unwrap_or(false);
        let decision = decide(&DecisionFacts {
            breaking: run.breaking(),
            severity: run.severity(),
            strategy: run.pipeline.policy.healing_strategy,
            auto_heal_allowed: run.pipeline.policy.auto_heal_allowed,
            healed: run.healing.as_ref().map(|h| h.applied).unwrap_or(false),
            plan_automatic: run
                .healing
                .as_ref()
                .map(|h| h.plan.is_fully_automatic())
                .unwrap_or(false),
            aborted: failure.is_some(),
            notification_failed,
        });

        let mut span = trace.start_stage(RunStage::Decided.as_str());
        span.set_attribute("decision", json!(decision.as_str()));
        trace.record(span);

        let response = DetectDriftResponse {
            request_id,
            pipeline_id: pipeline_id.to_string(),
            decision,
            severity: run.severity(),
            drift: run.reports.iter().any(DriftReport::has_drift),
            breaking: run.breaking(),
            details: RunDetails {
                impacted_pipelines: self.impacted_pipelines(&run.reports),
                reports: run.reports,
                explanation: run.explanation,
                healing: run.healing,
                notification: run.notification,
                failure,
                trace: trace.finalize(),
            },
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_run(decision, started.elapsed().as_secs_f64());
        }
        info!(
            request_id = %request_id,
            pipeline_id,
            decision = decision.as_str(),
            severity = response.severity.as_str(),
            duration_ms = started.elapsed().as_millis() as u64,
            "{}",
            response.summary()
        );
        Ok(response)
    }

    fn identify(&self, request_id: Uuid, pipeline_id: &str) -> Result<Run> {
        let pipeline = self.catalog.pipeline(pipeline_id)?;
        let ruleset = self.catalog.ruleset(&pipeline.policy.severity_ruleset)?;
        let components = pipeline
            .sources
            .iter()
            .map(|name| self.catalog.component(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Run {
            request_id,
            pipeline,
            ruleset,
            components,
            extracted: Vec::new(),
            snapshots: Vec::new(),
            reports: Vec::new(),
            explanation: None,
            healing: None,
            notification: None,
        })
    }

    async fn run_stage(&self, stage: RunStage, run: &mut Run, span: &mut TraceSpan) -> Result<()> {
        match stage {
            RunStage::Crawled => self.crawl(run, span).await,
            RunStage::Persisted => self.persist(run, span),
            RunStage::Detected => self.detect(run, span).await,
            RunStage::Healed => self.heal(run, span).await,
            RunStage::SkippedHealing => {
                span.skip(if run.breaking() {
                    "auto-heal not allowed by policy"
                } else {
                    "no breaking drift"
                });
                Ok(())
            }
            RunStage::Notified => self.notify(run, span).await,
            RunStage::SkippedNotification => {
                span.skip(if run.breaking() {
                    "notify_on_breaking disabled"
                } else {
                    "no breaking drift"
                });
                Ok(())
            }
            RunStage::Start | RunStage::Identified | RunStage::Decided => Err(DriftError::validation(
                format!("stage '{}' is not executable", stage),
            )),
        }
    }

    async fn crawl(&self, run: &mut Run, span: &mut TraceSpan) -> Result<()> {
        for component in &run.components {
            let connector = self.connectors.for_kind(component.kind).ok_or_else(|| {
                DriftError::CollaboratorFailure {
                    collaborator: "connector",
                    message: format!("no connector for {} component '{}'", component.kind.as_str(), component.name),
                }
            })?;
            let fields = self
                .call("connector", connector.extract_schema(component))
                .await?;
            debug!(
                request_id = %run.request_id,
                component = %component.name,
                connector = connector.id(),
                fields = fields.len(),
                "Crawled component"
            );
            run.extracted.push(fields);
        }
        span.set_attribute("components", json!(run.components.len()));
        Ok(())
    }

    fn persist(&self, run: &mut Run, span: &mut TraceSpan) -> Result<()> {
        for (component, fields) in run.components.iter().zip(run.extracted.iter()) {
            let snapshot = self.lineage.record_snapshot(component, fields.clone())?;
            run.snapshots.push(snapshot);
        }
        let ids: Vec<String> = run.snapshots.iter().map(|s| s.id.to_string()).collect();
        span.set_attribute("snapshots", json!(ids));
        Ok(())
    }

    async fn detect(&self, run: &mut Run, span: &mut TraceSpan) -> Result<()> {
        let index = TransformationIndex::from_mappings(&run.pipeline.mappings);
        for snapshot in &run.snapshots {
            let previous = match self.lineage.previous_snapshot(snapshot.id) {
                Ok(previous) => Some(previous),
                Err(DriftError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };
            let report = self
                .engine
                .detect(snapshot, previous.as_ref(), &index, &run.ruleset)?;
            if let Some(metrics) = &self.metrics {
                metrics.record_changes(&report.changes);
            }
            info!(
                request_id = %run.request_id,
                component = %report.component,
                snapshot_id = %snapshot.id,
                changes = report.changes.len(),
                severity = report.severity.as_str(),
                breaking = report.breaking,
                "Drift detected"
            );
            run.reports.push(report);
        }

        if let Some(reasoner) = &self.reasoner {
            let mut explanations = Vec::new();
            for report in run.reports.iter().filter(|r| r.has_drift()) {
                match self.call("reasoner", reasoner.summarize(report)).await {
                    Ok(text) => explanations.push(text),
                    Err(e) => warn!(
                        request_id = %run.request_id,
                        component = %report.component,
                        error = %e,
                        "Reasoner unavailable, keeping deterministic summary"
                    ),
                }
            }
            if !explanations.is_empty() {
                run.explanation = Some(explanations.join("\n"));
            }
        }

        span.set_attribute("severity", json!(run.severity().as_str()));
        span.set_attribute("breaking", json!(run.breaking()));
        Ok(())
    }

    async fn heal(&self, run: &mut Run, span: &mut TraceSpan) -> Result<()> {
        let healer = self.healer.as_ref().ok_or_else(|| DriftError::CollaboratorFailure {
            collaborator: "healer",
            message: "no healer configured".to_string(),
        })?;

        let mut plan = build_plan(&run.reports);
        if let Some(reasoner) = &self.reasoner {
            for action in plan.actions.iter_mut().filter(|a| a.kind.is_automatic()) {
                match self.call("reasoner", reasoner.score_confidence(action)).await {
                    Ok(score) => action.confidence = score.min(100),
                    Err(e) => debug!(field = %action.field, error = %e, "Keeping default confidence"),
                }
            }
        }

        let request = HealingRequest {
            request_id: run.request_id,
            pipeline_id: run.pipeline.id.clone(),
            strategy: run.pipeline.policy.healing_strategy,
            severity: run.severity(),
            plan,
        };
        let outcome = self.call("healer", healer.heal(&request)).await?;
        span.set_attribute("applied", json!(outcome.applied));
        span.set_attribute("actions", json!(outcome.plan.actions.len()));
        if let Some(reference) = &outcome.reference {
            span.set_attribute("reference", json!(reference));
        }
        run.healing = Some(outcome);
        Ok(())
    }

    async fn notify(&self, run: &mut Run, span: &mut TraceSpan) -> Result<()> {
        let policy = &run.pipeline.policy;
        let payload = NotificationPayload {
            request_id: run.request_id,
            pipeline_id: run.pipeline.id.clone(),
            severity: run.severity(),
            summary: run.explanation.clone().unwrap_or_else(|| {
                run.reports
                    .iter()
                    .map(|r| r.summary.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            }),
            operator_contact: policy.operator_contact.clone(),
            changes: run
                .reports
                .iter()
                .flat_map(|r| r.changes.iter().map(move |c| format!("{}: {}", r.component, c.describe())))
                .collect(),
        };

        if policy.notify_channels.is_empty() {
            warn!(request_id = %run.request_id, pipeline_id = %run.pipeline.id, "Breaking drift but no notification channels");
        }

        let sends = policy.notify_channels.iter().map(|channel| {
            let payload = &payload;
            async move {
                let result = match &self.notifier {
                    Some(notifier) => self.call("notifier", notifier.send(channel, payload)).await,
                    None => Err(DriftError::CollaboratorFailure {
                        collaborator: "notifier",
                        message: "no notifier configured".to_string(),
                    }),
                };
                match result {
                    Ok(_) => ChannelDelivery {
                        channel: channel.clone(),
                        delivered: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!(request_id = %payload.request_id, channel = %channel, error = %e, "Notification failed");
                        ChannelDelivery {
                            channel: channel.clone(),
                            delivered: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });
        // every channel is attempted, in channel order
        let outcome = NotificationOutcome {
            deliveries: futures::future::join_all(sends).await,
        };

        span.set_attribute("channels", json!(outcome.deliveries.len()));
        if !outcome.all_delivered() {
            span.fail(format!("undelivered: {}", outcome.failed_channels().join(", ")));
        }
        run.notification = Some(outcome);
        Ok(())
    }

    fn abort(&self, request_id: Uuid, stage: RunStage, error: &DriftError) -> RunFailure {
        warn!(
            request_id = %request_id,
            stage = stage.as_str(),
            error_kind = error.kind(),
            error = %error,
            "Run aborted, forcing manual review"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_stage_failure(stage.as_str());
        }
        RunFailure {
            stage,
            kind: error.kind().to_string(),
            cause: error.to_string(),
        }
    }

    fn impacted_pipelines(&self, reports: &[DriftReport]) -> Vec<String> {
        let mut impacted = BTreeSet::new();
        for report in reports {
            match self.catalog.pipelines_using(&report.component) {
                Ok(ids) => impacted.extend(ids),
                Err(e) => warn!(component = %report.component, error = %e, "Impact lookup failed"),
            }
        }
        impacted.into_iter().collect()
    }

    async fn call<T, F>(&self, collaborator: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = CollaboratorResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DriftError::CollaboratorFailure {
                collaborator,
                message: e.to_string(),
            }),
            Err(_) => Err(DriftError::CollaboratorTimeout {
                collaborator,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn replay(response: &DetectDriftResponse, pipeline_id: &str) -> Result<DetectDriftResponse> {
    if response.pipeline_id != pipeline_id {
        return Err(DriftError::validation(format!(
            "request {} was already used for pipeline '{}'",
            response.request_id, response.pipeline_id
        )));
    }
    Ok(response.clone())
}
