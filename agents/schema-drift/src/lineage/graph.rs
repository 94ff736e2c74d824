//! Metadata graph abstraction
//!
//! The lineage store persists through a small key/edge contract: upsert by
//! unique key, append-only node inserts, the `PRECEDED_BY` edge carried on
//! each snapshot header, and a per-component latest index that only moves
//! through compare-and-set.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::contracts::{Component, SnapshotField, SnapshotHeader, SnapshotId};
use crate::error::{DriftError, Result};

/// Storage contract consumed by the lineage store
///
/// Implementations must be thread-safe. Nodes are never mutated after
/// insert; `discard_snapshot` only removes staged nodes that never became
/// reachable from the latest index.
pub trait MetadataGraph: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Insert or refresh a component by name. Returns the stored record.
    fn upsert_component(&self, component: &Component) -> Result<Component>;

    /// Look up a component by name
    fn component(&self, name: &str) -> Result<Option<Component>>;

    /// Persist one owned field copy keyed by `(snapshot_id, name)`
    fn insert_field(&self, field: &SnapshotField) -> Result<()>;

    /// Persist a snapshot header together with its `PRECEDED_BY` edge
    fn insert_snapshot(&self, header: &SnapshotHeader) -> Result<()>;

    /// Fetch a snapshot header
    fn snapshot_header(&self, id: SnapshotId) -> Result<Option<SnapshotHeader>>;

    /// Fetch all field copies owned by a snapshot, in any order
    fn snapshot_fields(&self, id: SnapshotId) -> Result<Vec<SnapshotField>>;

    /// Current latest snapshot of a component
    fn latest(&self, component: &str) -> Result<Option<SnapshotId>>;

    /// Advance the latest index iff it still equals `expected`.
    ///
    /// Returns `false` when another writer moved it first.
    fn compare_and_set_latest(
        &self,
        component: &str,
        expected: Option<SnapshotId>,
        new: SnapshotId,
    ) -> Result<bool>;

    /// Drop a staged snapshot that lost the latest race or failed mid-write
    fn discard_snapshot(&self, id: SnapshotId) -> Result<()>;
}

#[derive(Default)]
struct Arena {
    components: HashMap<String, Component>,
    headers: HashMap<SnapshotId, SnapshotHeader>,
    fields: HashMap<SnapshotId, HashMap<String, SnapshotField>>,
    latest: HashMap<String, SnapshotId>,
}

/// In-process arena of immutable records plus a latest index
#[derive(Default)]
pub struct InMemoryGraph {
    arena: RwLock<Arena>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshot headers held (staged ones included)
    pub fn snapshot_count(&self) -> Result<usize> {
        let arena = self.arena.read().map_err(DriftError::store)?;
        Ok(arena.headers.len())
    }
}

impl std::fmt::Debug for InMemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraph").finish_non_exhaustive()
    }
}

impl MetadataGraph for InMemoryGraph {
    fn name(&self) -> &str {
        "memory"
    }

    fn upsert_component(&self, component: &Component) -> Result<Component> {
        let mut arena = self.arena.write().map_err(DriftError::store)?;
        let stored = arena
            .components
            .entry(component.name.clone())
            .or_insert_with(|| component.clone());
        // identity is fixed at first insert; only last_seen and the locator move
        stored.last_seen = component.last_seen.or(stored.last_seen);
        if component.locator.is_some() {
            stored.locator = component.locator.clone();
        }
        Ok(stored.clone())
    }

    fn component(&self, name: &str) -> Result<Option<Component>> {
        let arena = self.arena.read().map_err(DriftError::store)?;
        Ok(arena.components.get(name).cloned())
    }

    fn insert_field(&self, field: &SnapshotField) -> Result<()> {
        let mut arena = self.arena.write().map_err(DriftError::store)?;
        let owned = arena.fields.entry(field.snapshot_id).or_default();
        if owned.contains_key(&field.name) {
            return Err(DriftError::store(format!(
                "field '{}' already recorded for snapshot {}",
                field.name, field.snapshot_id
            )));
        }
        owned.insert(field.name.clone(), field.clone());
        Ok(())
    }

    fn insert_snapshot(&self, header: &SnapshotHeader) -> Result<()> {
        let mut arena = self.arena.write().map_err(DriftError::store)?;
        if arena.headers.contains_key(&header.id) {
            return Err(DriftError::store(format!("snapshot {} already exists", header.id)));
        }
        arena.headers.insert(header.id, header.clone());
        Ok(())
    }

    fn snapshot_header(&self, id: SnapshotId) -> Result<Option<SnapshotHeader>> {
        let arena = self.arena.read().map_err(DriftError::store)?;
        Ok(arena.headers.get(&id).cloned())
    }

    fn snapshot_fields(&self, id: SnapshotId) -> Result<Vec<SnapshotField>> {
        let arena = self.arena.read().map_err(DriftError::store)?;
        Ok(arena
            .fields
            .get(&id)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default())
    }

    fn latest(&self, component: &str) -> Result<Option<SnapshotId>> {
        let arena = self.arena.read().map_err(DriftError::store)?;
        Ok(arena.latest.get(component).copied())
    }

    fn compare_and_set_latest(
        &self,
        component: &str,
        expected: Option<SnapshotId>,
        new: SnapshotId,
    ) -> Result<bool> {
        let mut arena = self.arena.write().map_err(DriftError::store)?;
        if arena.latest.get(component).copied() != expected {
            return Ok(false);
        }
        arena.latest.insert(component.to_string(), new);
        Ok(true)
    }

    fn discard_snapshot(&self, id: SnapshotId) -> Result<()> {
        let mut arena = self.arena.write().map_err(DriftError::store)?;
        if arena.latest.values().any(|latest| *latest == id) {
            return Err(DriftError::store(format!(
                "refusing to discard visible snapshot {}",
                id
            )));
        }
        arena.headers.remove(&id);
        arena.fields.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ComponentKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn header(component: &str, preceded_by: Option<SnapshotId>) -> SnapshotHeader {
        SnapshotHeader {
            id: Uuid::new_v4(),
            component: component.to_string(),
            sequence: 1,
            version: "v1".to_string(),
            created_at: Utc::now(),
            preceded_by,
            field_count: 0,
        }
    }

    #[test]
    fn test_cas_rejects_stale_expectation() {
        let graph = InMemoryGraph::new();
        let first = header("orders", None);
        graph.insert_snapshot(&first).unwrap();
        assert!(graph.compare_and_set_latest("orders", None, first.id).unwrap());

        let second = header("orders", None);
        graph.insert_snapshot(&second).unwrap();
        assert!(!graph.compare_and_set_latest("orders", None, second.id).unwrap());
        assert_eq!(graph.latest("orders").unwrap(), Some(first.id));
    }

    #[test]
    fn test_upsert_keeps_identity() {
        let graph = InMemoryGraph::new();
        let mut component = Component::new("orders", ComponentKind::Database);
        graph.upsert_component(&component).unwrap();

        component.kind = ComponentKind::File;
        component.last_seen = Some(Utc::now());
        let stored = graph.upsert_component(&component).unwrap();
        assert_eq!(stored.kind, ComponentKind::Database);
        assert!(stored.last_seen.is_some());
    }

    #[test]
    fn test_discard_refuses_latest() {
        let graph = InMemoryGraph::new();
        let first = header("orders", None);
        graph.insert_snapshot(&first).unwrap();
        graph.compare_and_set_latest("orders", None, first.id).unwrap();
        assert!(graph.discard_snapshot(first.id).is_err());
    }

    #[test]
    fn test_discard_drops_staged_nodes() {
        let graph = InMemoryGraph::new();
        let first = header("orders", None);
        graph.insert_snapshot(&first).unwrap();
        graph.compare_and_set_latest("orders", None, first.id).unwrap();

        let staged = header("orders", Some(first.id));
        graph.insert_snapshot(&staged).unwrap();
        assert_eq!(graph.snapshot_count().unwrap(), 2);

        graph.discard_snapshot(staged.id).unwrap();
        assert_eq!(graph.snapshot_count().unwrap(), 1);
        assert!(graph.snapshot_header(staged.id).unwrap().is_none());
    }
}
