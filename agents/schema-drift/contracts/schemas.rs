//! Domain types for components, snapshots and pipelines
//!
//! Shape metadata only. No type in this module ever carries sample data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Globally unique snapshot identifier
pub type SnapshotId = Uuid;

/// Kind of data source or sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    File,
    Database,
    Api,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Database => "database",
            Self::Api => "api",
        }
    }
}

/// A named, typed data source or sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Unique name (identity, immutable once created)
    pub name: String,

    /// Component kind
    pub kind: ComponentKind,

    /// Optional physical locator (path, DSN, URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,

    /// Last time a snapshot was recorded for this component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Component {
    /// Create a component with no locator
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            locator: None,
            last_seen: None,
        }
    }

    /// Set the physical locator
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

/// One field as reported by a connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub name: String,

    /// Declared data type
    #[serde(alias = "type")]
    pub data_type: String,

    /// Whether the field accepts nulls
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// 0-based declared position
    #[serde(default)]
    pub ordinal: u32,

    /// Whether the source declares a default value
    #[serde(default)]
    pub has_default: bool,

    /// Free-form connector hints (inferred format, max length, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hints: BTreeMap<String, String>,
}

fn default_nullable() -> bool {
    true
}

impl FieldSpec {
    /// Create a field spec
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            ordinal,
            has_default: false,
            hints: BTreeMap::new(),
        }
    }

    /// Mark the field as having a declared default
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

/// Immutable copy of a field's shape owned by exactly one snapshot.
///
/// Identified by `(snapshot_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotField {
    /// Owning snapshot
    pub snapshot_id: SnapshotId,

    /// Field name
    pub name: String,

    /// Declared data type
    pub data_type: String,

    /// Whether the field accepts nulls
    pub nullable: bool,

    /// 0-based declared position
    pub ordinal: u32,

    /// Whether the source declared a default value
    #[serde(default)]
    pub has_default: bool,

    /// Connector hints copied verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hints: BTreeMap<String, String>,
}

impl SnapshotField {
    /// Copy a connector field into a snapshot-owned field
    pub fn copy_of(snapshot_id: SnapshotId, spec: &FieldSpec) -> Self {
        Self {
            snapshot_id,
            name: spec.name.clone(),
            data_type: spec.data_type.clone(),
            nullable: spec.nullable,
            ordinal: spec.ordinal,
            has_default: spec.has_default,
            hints: spec.hints.clone(),
        }
    }
}

/// Snapshot header as stored in the metadata graph (fields live separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Snapshot identifier
    pub id: SnapshotId,

    /// Owning component name
    pub component: String,

    /// 1-based position in the component's version chain
    pub sequence: u64,

    /// Logical version label (`v{sequence}`)
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Immediately preceding snapshot of the same component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceded_by: Option<SnapshotId>,

    /// Number of field copies that make the snapshot complete
    pub field_count: usize,
}

/// Immutable capture of a component's schema at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot identifier
    pub id: SnapshotId,

    /// Owning component name
    pub component: String,

    /// 1-based position in the component's version chain
    pub sequence: u64,

    /// Logical version label
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Immediately preceding snapshot (`PRECEDED_BY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceded_by: Option<SnapshotId>,

    /// Owned field copies ordered by ordinal
    pub fields: Vec<SnapshotField>,
}

impl Snapshot {
    /// Assemble a snapshot from its stored header and field copies
    pub fn from_parts(header: SnapshotHeader, mut fields: Vec<SnapshotField>) -> Self {
        fields.sort_by_key(|f| f.ordinal);
        Self {
            id: header.id,
            component: header.component,
            sequence: header.sequence,
            version: header.version,
            created_at: header.created_at,
            preceded_by: header.preceded_by,
            fields,
        }
    }

    /// Look up a field by exact name
    pub fn field(&self, name: &str) -> Option<&SnapshotField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Reference to a field of a component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Component name
    pub component: String,

    /// Field name
    pub field: String,
}

impl FieldRef {
    pub fn new(component: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            field: field.into(),
        }
    }
}

/// A pipeline's declared derivation of a target field from a source field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationMapping {
    /// Owning pipeline (filled in by the catalog when omitted)
    #[serde(default)]
    pub pipeline_id: String,

    /// Position within the pipeline's mapping list
    #[serde(default)]
    pub position: u32,

    /// Source field
    pub source: FieldRef,

    /// Target field
    pub target: FieldRef,

    /// Expression text
    #[serde(default)]
    pub expression: String,

    /// Human description
    #[serde(default)]
    pub description: String,
}

/// How breaking drift is remediated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingStrategy {
    Patch,
    Pause,
    Manual,
}

impl HealingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Pause => "pause",
            Self::Manual => "manual",
        }
    }
}

/// Per-pipeline governance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Whether breaking drift may be healed automatically
    #[serde(default)]
    pub auto_heal_allowed: bool,

    /// Whether breaking drift triggers notifications
    #[serde(default = "default_true")]
    pub notify_on_breaking: bool,

    /// Notification channel identifiers
    #[serde(default)]
    pub notify_channels: BTreeSet<String>,

    /// Operator to contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_contact: Option<String>,

    /// Remediation strategy
    #[serde(default = "default_strategy")]
    pub healing_strategy: HealingStrategy,

    /// Ruleset used by the detection engine
    #[serde(default = "default_ruleset")]
    pub severity_ruleset: String,
}

fn default_true() -> bool {
    true
}

fn default_strategy() -> HealingStrategy {
    HealingStrategy::Manual
}

fn default_ruleset() -> String {
    "default".to_string()
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            auto_heal_allowed: false,
            notify_on_breaking: true,
            notify_channels: BTreeSet::new(),
            operator_contact: None,
            healing_strategy: default_strategy(),
            severity_ruleset: default_ruleset(),
        }
    }
}

/// A named ETL job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline identifier
    pub id: String,

    /// Human name
    #[serde(default)]
    pub name: String,

    /// Schedule descriptor (cron or free text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Consumed component names, crawled in this order
    #[serde(default)]
    pub sources: Vec<String>,

    /// Produced component names
    #[serde(default)]
    pub targets: Vec<String>,

    /// Transformation mappings ordered by position
    #[serde(default)]
    pub mappings: Vec<TransformationMapping>,

    /// Governance policy
    #[serde(default)]
    pub policy: Policy,
}

impl Pipeline {
    /// Whether the pipeline consumes or produces `component`
    pub fn touches(&self, component: &str) -> bool {
        self.sources.iter().chain(self.targets.iter()).any(|c| c == component)
    }
}
