//! Drift report value objects
//!
//! Produced per comparison by the detection engine. Never persisted by the
//! lineage store; callers may archive them.

use serde::{Deserialize, Serialize};

use super::SnapshotId;

/// Severity tiers, ordered `low < medium < high < critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// One tier up, saturating at `Critical`
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Low
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of atomic change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    TypeChanged,
    NullabilityChanged,
    OrdinalChanged,
    /// Heuristic only; the literal added/removed records are always kept
    Renamed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::TypeChanged => "type_changed",
            Self::NullabilityChanged => "nullability_changed",
            Self::OrdinalChanged => "ordinal_changed",
            Self::Renamed => "renamed",
        }
    }
}

/// Row of a severity ruleset. Refines `ChangeKind` with the field shape
/// that decides the baseline severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    /// Non-nullable field removed
    RemovedRequired,
    /// Nullable field removed
    RemovedNullable,
    /// Non-nullable field without default added
    AddedRequired,
    /// Non-nullable field with a declared default added
    AddedWithDefault,
    /// Nullable field added
    AddedNullable,
    TypeChanged,
    /// nullable -> required
    NullabilityTightened,
    /// required -> nullable
    NullabilityRelaxed,
    OrdinalChanged,
    Renamed,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 10] = [
        ChangeCategory::RemovedRequired,
        ChangeCategory::RemovedNullable,
        ChangeCategory::AddedRequired,
        ChangeCategory::AddedWithDefault,
        ChangeCategory::AddedNullable,
        ChangeCategory::TypeChanged,
        ChangeCategory::NullabilityTightened,
        ChangeCategory::NullabilityRelaxed,
        ChangeCategory::OrdinalChanged,
        ChangeCategory::Renamed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemovedRequired => "removed_required",
            Self::RemovedNullable => "removed_nullable",
            Self::AddedRequired => "added_required",
            Self::AddedWithDefault => "added_with_default",
            Self::AddedNullable => "added_nullable",
            Self::TypeChanged => "type_changed",
            Self::NullabilityTightened => "nullability_tightened",
            Self::NullabilityRelaxed => "nullability_relaxed",
            Self::OrdinalChanged => "ordinal_changed",
            Self::Renamed => "renamed",
        }
    }

    /// Change kind this category belongs to
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::RemovedRequired | Self::RemovedNullable => ChangeKind::Removed,
            Self::AddedRequired | Self::AddedWithDefault | Self::AddedNullable => ChangeKind::Added,
            Self::TypeChanged => ChangeKind::TypeChanged,
            Self::NullabilityTightened | Self::NullabilityRelaxed => ChangeKind::NullabilityChanged,
            Self::OrdinalChanged => ChangeKind::OrdinalChanged,
            Self::Renamed => ChangeKind::Renamed,
        }
    }
}

/// One atomic change between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Change kind
    pub kind: ChangeKind,

    /// Ruleset row that classified this change
    pub category: ChangeCategory,

    /// Field name (current name for renames)
    pub field: String,

    /// Previous name, set on `renamed` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_field: Option<String>,

    /// Value before the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,

    /// Value after the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,

    /// Whether the field feeds or receives a transformation mapping
    pub transformation_impacted: bool,

    /// Severity from the ruleset before impact escalation
    pub baseline_severity: Severity,

    /// Contribution to the overall severity
    pub severity: Severity,

    /// Whether this change alone is breaking
    pub breaking: bool,

    /// Heuristic rename partners (removed <-> added with identical shape)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rename_candidates: Vec<String>,
}

impl FieldChange {
    /// Short human description
    pub fn describe(&self) -> String {
        let mut line = match self.kind {
            ChangeKind::Renamed => format!(
                "renamed {} -> {}",
                self.previous_field.as_deref().unwrap_or("?"),
                self.field
            ),
            _ => match (&self.old_value, &self.new_value) {
                (Some(old), Some(new)) => format!("{} {} ({} -> {})", self.kind.as_str(), self.field, old, new),
                _ => format!("{} {}", self.kind.as_str(), self.field),
            },
        };
        line.push_str(&format!(" [{}]", self.severity));
        line
    }
}

/// Result of comparing two snapshots of one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Component both snapshots belong to
    pub component: String,

    /// Newer snapshot
    pub current_snapshot_id: SnapshotId,

    /// Older snapshot (none for the first snapshot of a component)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_snapshot_id: Option<SnapshotId>,

    /// Ruleset used for classification
    pub ruleset_id: String,

    /// Ordered changes
    pub changes: Vec<FieldChange>,

    /// Maximum per-change severity (`low` when there are no changes)
    pub severity: Severity,

    /// Overall breaking verdict
    pub breaking: bool,

    /// Deterministic one-line summary
    pub summary: String,

    /// SHA-256 over the comparison inputs and the change list
    pub fingerprint: String,
}

impl DriftReport {
    /// Whether any structural difference was found
    pub fn has_drift(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Changes for one field name
    pub fn changes_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldChange> + 'a {
        self.changes.iter().filter(move |c| c.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_escalate_saturates() {
        assert_eq!(Severity::Low.escalate(), Severity::Medium);
        assert_eq!(Severity::High.escalate(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }

    #[test]
    fn test_category_kinds() {
        for category in ChangeCategory::ALL {
            let kind = category.kind();
            assert!(category.as_str().starts_with(kind.as_str().split('_').next().unwrap()));
        }
    }
}
