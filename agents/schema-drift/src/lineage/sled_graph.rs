//! Durable metadata graph on sled
//!
//! Trees:
//! - `components`: name -> Component (JSON)
//! - `snapshots`: snapshot id -> SnapshotHeader (JSON, carries `PRECEDED_BY`)
//! - `fields`: snapshot id ++ field name -> SnapshotField (JSON)
//! - `latest`: component name -> snapshot id (16 raw bytes)

use std::path::Path;

use sled::{Db, Tree};
use tracing::debug;
use uuid::Uuid;

use super::graph::MetadataGraph;
use crate::contracts::{Component, SnapshotField, SnapshotHeader, SnapshotId};
use crate::error::{DriftError, Result};

/// sled-backed metadata graph
pub struct SledGraph {
    db: Db,
    components: Tree,
    snapshots: Tree,
    fields: Tree,
    latest: Tree,
}

impl SledGraph {
    /// Open (or create) a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// Throwaway store removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            components: db.open_tree("components")?,
            snapshots: db.open_tree("snapshots")?,
            fields: db.open_tree("fields")?,
            latest: db.open_tree("latest")?,
            db,
        })
    }

    fn field_key(snapshot_id: SnapshotId, name: &str) -> Vec<u8> {
        let mut key = snapshot_id.as_bytes().to_vec();
        key.extend_from_slice(name.as_bytes());
        key
    }

    fn decode_id(bytes: &[u8]) -> Result<SnapshotId> {
        Uuid::from_slice(bytes).map_err(|e| DriftError::store(format!("corrupt snapshot id: {}", e)))
    }
}

impl std::fmt::Debug for SledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledGraph")
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}

impl MetadataGraph for SledGraph {
    fn name(&self) -> &str {
        "sled"
    }

    fn upsert_component(&self, component: &Component) -> Result<Component> {
        let key = component.name.as_bytes();
        loop {
            let current = self.components.get(key)?;
            let mut stored = match &current {
                Some(bytes) => serde_json::from_slice::<Component>(bytes)?,
                None => component.clone(),
            };
            stored.last_seen = component.last_seen.or(stored.last_seen);
            if component.locator.is_some() {
                stored.locator = component.locator.clone();
            }
            let encoded = serde_json::to_vec(&stored)?;
            match self.components.compare_and_swap(key, current, Some(encoded))? {
                Ok(()) => return Ok(stored),
                Err(_) => continue,
            }
        }
    }

    fn component(&self, name: &str) -> Result<Option<Component>> {
        self.components
            .get(name.as_bytes())?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(DriftError::from))
            .transpose()
    }

    fn insert_field(&self, field: &SnapshotField) -> Result<()> {
        let key = Self::field_key(field.snapshot_id, &field.name);
        let encoded = serde_json::to_vec(field)?;
        match self.fields.compare_and_swap(key, None as Option<&[u8]>, Some(encoded))? {
            Ok(()) => Ok(()),
            Err(_) => Err(DriftError::store(format!(
                "field '{}' already recorded for snapshot {}",
                field.name, field.snapshot_id
            ))),
        }
    }

    fn insert_snapshot(&self, header: &SnapshotHeader) -> Result<()> {
        let encoded = serde_json::to_vec(header)?;
        match self
            .snapshots
            .compare_and_swap(header.id.as_bytes(), None as Option<&[u8]>, Some(encoded))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(DriftError::store(format!("snapshot {} already exists", header.id))),
        }
    }

    fn snapshot_header(&self, id: SnapshotId) -> Result<Option<SnapshotHeader>> {
        self.snapshots
            .get(id.as_bytes())?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(DriftError::from))
            .transpose()
    }

    fn snapshot_fields(&self, id: SnapshotId) -> Result<Vec<SnapshotField>> {
        let mut fields = Vec::new();
        for entry in self.fields.scan_prefix(id.as_bytes()) {
            let (_, bytes) = entry?;
            fields.push(serde_json::from_slice(&bytes)?);
        }
        Ok(fields)
    }

    fn latest(&self, component: &str) -> Result<Option<SnapshotId>> {
        self.latest
            .get(component.as_bytes())?
            .map(|bytes| Self::decode_id(&bytes))
            .transpose()
    }

    fn compare_and_set_latest(
        &self,
        component: &str,
        expected: Option<SnapshotId>,
        new: SnapshotId,
    ) -> Result<bool> {
        // field copies and the header must be durable before they become reachable
        self.db.flush()?;
        let expected = expected.map(|id| id.as_bytes().to_vec());
        let swapped = self
            .latest
            .compare_and_swap(component.as_bytes(), expected, Some(new.as_bytes().to_vec()))?
            .is_ok();
        if swapped {
            self.latest.flush()?;
        } else {
            debug!(component, snapshot_id = %new, "latest pointer moved by another writer");
        }
        Ok(swapped)
    }

    fn discard_snapshot(&self, id: SnapshotId) -> Result<()> {
        for entry in self.latest.iter() {
            let (_, bytes) = entry?;
            if Self::decode_id(&bytes)? == id {
                return Err(DriftError::store(format!(
                    "refusing to discard visible snapshot {}",
                    id
                )));
            }
        }
        for key in self.fields.scan_prefix(id.as_bytes()).keys() {
            self.fields.remove(key?)?;
        }
        self.snapshots.remove(id.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ComponentKind, FieldSpec};
    use chrono::Utc;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let graph = SledGraph::open(dir.path()).unwrap();
            graph
                .upsert_component(&Component::new("orders", ComponentKind::File))
                .unwrap();
            graph
                .insert_field(&SnapshotField::copy_of(id, &FieldSpec::new("id", "int", false, 0)))
                .unwrap();
            graph
                .insert_snapshot(&SnapshotHeader {
                    id,
                    component: "orders".into(),
                    sequence: 1,
                    version: "v1".into(),
                    created_at: Utc::now(),
                    preceded_by: None,
                    field_count: 1,
                })
                .unwrap();
            assert!(graph.compare_and_set_latest("orders", None, id).unwrap());
        }

        let graph = SledGraph::open(dir.path()).unwrap();
        assert_eq!(graph.latest("orders").unwrap(), Some(id));
        assert_eq!(graph.snapshot_fields(id).unwrap().len(), 1);
        assert!(graph.component("orders").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let graph = SledGraph::temporary().unwrap();
        let field = SnapshotField::copy_of(Uuid::new_v4(), &FieldSpec::new("id", "int", false, 0));
        graph.insert_field(&field).unwrap();
        assert!(graph.insert_field(&field).is_err());
    }

    #[test]
    fn test_stale_cas_fails() {
        let graph = SledGraph::temporary().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(graph.compare_and_set_latest("orders", None, a).unwrap());
        assert!(!graph.compare_and_set_latest("orders", None, b).unwrap());
        assert!(graph.compare_and_set_latest("orders", Some(a), b).unwrap());
    }
}
