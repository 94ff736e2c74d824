//! Snapshot Lineage Store
//!
//! Owns the versioned, append-only history of each component's schema.
//! Every recorded snapshot gets fresh field copies and a `PRECEDED_BY` link
//! to the component's previous latest snapshot.
//!
//! # Visibility
//!
//! Writes are staged in this order: field copies, header, latest pointer.
//! The latest pointer moves only through compare-and-set after every field
//! copy is stored, so a partially written snapshot is never reachable. A
//! writer that loses the race discards its staged nodes, re-reads latest
//! and retries once before surfacing `ConcurrencyConflict`.

pub mod graph;
pub mod payload;
pub mod sled_graph;

pub use graph::{InMemoryGraph, MetadataGraph};
pub use payload::{CanonicalPayload, FORBIDDEN_SNAPSHOT_KEYS};
pub use sled_graph::SledGraph;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contracts::{Component, FieldSpec, Snapshot, SnapshotField, SnapshotHeader, SnapshotId};
use crate::error::{DriftError, Result};
use crate::telemetry::DriftMetrics;

/// Versioned schema history over a metadata graph
#[derive(Clone)]
pub struct LineageStore {
    graph: Arc<dyn MetadataGraph>,
    metrics: Option<Arc<DriftMetrics>>,
}

impl std::fmt::Debug for LineageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageStore")
            .field("graph", &self.graph.name())
            .finish()
    }
}

impl LineageStore {
    pub fn new(graph: Arc<dyn MetadataGraph>) -> Self {
        Self { graph, metrics: None }
    }

    /// Store backed by a fresh in-memory arena
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryGraph::new()))
    }

    /// Count CAS conflicts in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<DriftMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record a new immutable snapshot and make it the component's latest.
    ///
    /// Fails with `Validation` on empty names, duplicate names or duplicate
    /// ordinals, before anything is written.
    pub fn record_snapshot(&self, component: &Component, fields: Vec<FieldSpec>) -> Result<Snapshot> {
        validate_fields(&component.name, &fields)?;

        let mut seen = component.clone();
        seen.last_seen = Some(Utc::now());
        let stored = self.graph.upsert_component(&seen)?;
        if stored.kind != component.kind {
            warn!(
                component = %component.name,
                stored_kind = stored.kind.as_str(),
                supplied_kind = component.kind.as_str(),
                "component kind is immutable, keeping stored kind"
            );
        }

        if let Some(snapshot) = self.try_record(&component.name, &fields)? {
            return Ok(snapshot);
        }

        warn!(component = %component.name, "snapshot write lost the race, retrying with fresh latest");
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_conflict();
        }

        match self.try_record(&component.name, &fields)? {
            Some(snapshot) => Ok(snapshot),
            None => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_snapshot_conflict();
                }
                Err(DriftError::ConcurrencyConflict {
                    component: component.name.clone(),
                })
            }
        }
    }

    /// One optimistic attempt. `None` means another writer advanced latest.
    fn try_record(&self, component: &str, fields: &[FieldSpec]) -> Result<Option<Snapshot>> {
        let expected = self.graph.latest(component)?;
        let sequence = match expected {
            Some(previous) => self.header(previous)?.sequence + 1,
            None => 1,
        };

        let id = Uuid::new_v4();
        let copies: Vec<SnapshotField> = fields.iter().map(|f| SnapshotField::copy_of(id, f)).collect();
        let header = SnapshotHeader {
            id,
            component: component.to_string(),
            sequence,
            version: format!("v{}", sequence),
            created_at: Utc::now(),
            preceded_by: expected,
            field_count: copies.len(),
        };

        if let Err(e) = self.stage(&header, &copies) {
            if let Err(cleanup) = self.graph.discard_snapshot(id) {
                warn!(snapshot_id = %id, error = %cleanup, "failed to discard partial snapshot");
            }
            return Err(e);
        }

        if !self.graph.compare_and_set_latest(component, expected, id)? {
            self.graph.discard_snapshot(id)?;
            return Ok(None);
        }

        info!(
            component,
            snapshot_id = %id,
            version = %header.version,
            field_count = header.field_count,
            backend = self.graph.name(),
            "Recorded snapshot"
        );
        Ok(Some(Snapshot::from_parts(header, copies)))
    }

    fn stage(&self, header: &SnapshotHeader, copies: &[SnapshotField]) -> Result<()> {
        for copy in copies {
            self.graph.insert_field(copy)?;
        }
        self.graph.insert_snapshot(header)
    }

    /// Most recently recorded snapshot of a component
    pub fn latest_snapshot(&self, component: &str) -> Result<Snapshot> {
        let id = self
            .graph
            .latest(component)?
            .ok_or_else(|| DriftError::not_found("component", component))?;
        self.snapshot(id)
    }

    /// Follow the `PRECEDED_BY` link
    pub fn previous_snapshot(&self, snapshot_id: SnapshotId) -> Result<Snapshot> {
        let header = self.header(snapshot_id)?;
        let previous = header
            .preceded_by
            .ok_or_else(|| DriftError::not_found("previous snapshot", snapshot_id.to_string()))?;
        self.snapshot(previous)
    }

    /// Field copies of a snapshot in strictly increasing ordinal order
    pub fn fields_of(&self, snapshot_id: SnapshotId) -> Result<Vec<SnapshotField>> {
        Ok(self.snapshot(snapshot_id)?.fields)
    }

    /// Load a complete snapshot by id
    pub fn snapshot(&self, snapshot_id: SnapshotId) -> Result<Snapshot> {
        let header = self.header(snapshot_id)?;
        let fields = self.graph.snapshot_fields(snapshot_id)?;
        if fields.len() != header.field_count {
            return Err(DriftError::store(format!(
                "snapshot {} is incomplete ({} of {} fields)",
                snapshot_id,
                fields.len(),
                header.field_count
            )));
        }
        Ok(Snapshot::from_parts(header, fields))
    }

    /// Registered component record
    pub fn component(&self, name: &str) -> Result<Component> {
        self.graph
            .component(name)?
            .ok_or_else(|| DriftError::not_found("component", name))
    }

    /// Version chain of a component, newest first
    pub fn history(&self, component: &str) -> Result<Vec<SnapshotHeader>> {
        let mut chain = Vec::new();
        let mut cursor = self.graph.latest(component)?;
        while let Some(id) = cursor {
            let header = self.header(id)?;
            cursor = header.preceded_by;
            chain.push(header);
        }
        debug!(component, length = chain.len(), "Walked version chain");
        Ok(chain)
    }

    fn header(&self, snapshot_id: SnapshotId) -> Result<SnapshotHeader> {
        self.graph
            .snapshot_header(snapshot_id)?
            .ok_or_else(|| DriftError::not_found("snapshot", snapshot_id.to_string()))
    }
}

fn validate_fields(component: &str, fields: &[FieldSpec]) -> Result<()> {
    if component.trim().is_empty() {
        return Err(DriftError::validation("component name must not be empty"));
    }

    let mut names = HashSet::new();
    let mut ordinals = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(DriftError::validation(format!(
                "field at ordinal {} of '{}' has an empty name",
                field.ordinal, component
            )));
        }
        if !names.insert(field.name.as_str()) {
            return Err(DriftError::validation(format!(
                "duplicate field name '{}' in '{}'",
                field.name, component
            )));
        }
        if !ordinals.insert(field.ordinal) {
            return Err(DriftError::validation(format!(
                "duplicate ordinal {} in '{}' (field '{}')",
                field.ordinal, component, field.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ComponentKind;

    fn orders() -> Component {
        Component::new("orders", ComponentKind::Database)
    }

    fn fields(specs: &[(&str, &str, bool)]) -> Vec<FieldSpec> {
        specs
            .iter()
            .enumerate()
            .map(|(i, (name, ty, nullable))| FieldSpec::new(*name, *ty, *nullable, i as u32))
            .collect()
    }

    #[test]
    fn test_first_snapshot_has_no_predecessor() {
        let store = LineageStore::in_memory();
        let snapshot = store
            .record_snapshot(&orders(), fields(&[("id", "int", false)]))
            .unwrap();

        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.version, "v1");
        assert!(snapshot.preceded_by.is_none());
        assert!(matches!(
            store.previous_snapshot(snapshot.id),
            Err(DriftError::NotFound { .. })
        ));
    }

    #[test]
    fn test_chain_links_to_previous_latest() {
        let store = LineageStore::in_memory();
        let first = store
            .record_snapshot(&orders(), fields(&[("id", "int", false)]))
            .unwrap();
        let second = store
            .record_snapshot(&orders(), fields(&[("id", "int", false)]))
            .unwrap();

        assert_eq!(second.preceded_by, Some(first.id));
        assert_eq!(second.version, "v2");
        assert_eq!(store.latest_snapshot("orders").unwrap().id, second.id);
        assert_eq!(store.previous_snapshot(second.id).unwrap().id, first.id);
        assert_eq!(store.history("orders").unwrap().len(), 2);
    }

    #[test]
    fn test_unchanged_fields_are_copied_per_snapshot() {
        let store = LineageStore::in_memory();
        let first = store
            .record_snapshot(&orders(), fields(&[("id", "int", false)]))
            .unwrap();
        let second = store
            .record_snapshot(&orders(), fields(&[("id", "int", false)]))
            .unwrap();

        assert_eq!(first.fields[0].snapshot_id, first.id);
        assert_eq!(second.fields[0].snapshot_id, second.id);
        assert_eq!(store.fields_of(first.id).unwrap(), first.fields);
    }

    #[test]
    fn test_fields_ordered_by_ordinal() {
        let store = LineageStore::in_memory();
        let snapshot = store
            .record_snapshot(
                &orders(),
                vec![
                    FieldSpec::new("b", "int", true, 2),
                    FieldSpec::new("a", "int", true, 0),
                    FieldSpec::new("c", "int", true, 1),
                ],
            )
            .unwrap();

        let names: Vec<_> = store
            .fields_of(snapshot.id)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_validation_rejects_before_write() {
        let store = LineageStore::in_memory();

        let duplicate = fields(&[("id", "int", false), ("id", "string", true)]);
        assert!(matches!(
            store.record_snapshot(&orders(), duplicate),
            Err(DriftError::Validation(_))
        ));

        let empty = vec![FieldSpec::new("  ", "int", true, 0)];
        assert!(matches!(
            store.record_snapshot(&orders(), empty),
            Err(DriftError::Validation(_))
        ));

        let same_ordinal = vec![FieldSpec::new("a", "int", true, 0), FieldSpec::new("b", "int", true, 0)];
        assert!(matches!(
            store.record_snapshot(&orders(), same_ordinal),
            Err(DriftError::Validation(_))
        ));

        assert!(matches!(
            store.latest_snapshot("orders"),
            Err(DriftError::NotFound { .. })
        ));
    }

    #[test]
    fn test_latest_unknown_component() {
        let store = LineageStore::in_memory();
        let err = store.latest_snapshot("missing").unwrap_err();
        assert_eq!(err.to_string(), "component not found: missing");
    }

    #[test]
    fn test_sled_backend_chain() {
        let store = LineageStore::new(Arc::new(SledGraph::temporary().unwrap()));
        let first = store
            .record_snapshot(&orders(), fields(&[("id", "int", false)]))
            .unwrap();
        let second = store
            .record_snapshot(&orders(), fields(&[("id", "string", false)]))
            .unwrap();

        assert_eq!(store.previous_snapshot(second.id).unwrap().id, first.id);
        assert_eq!(store.fields_of(second.id).unwrap()[0].data_type, "string");
        assert!(store.component("orders").unwrap().last_seen.is_some());
    }
}
