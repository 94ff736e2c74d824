//! Per-field comparison rules
//!
//! Each rule inspects one field that survived by name and reports at most
//! one raw change. Classification happens later against the ruleset.

use crate::contracts::{ChangeCategory, SnapshotField};

/// Unclassified difference found by a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub category: ChangeCategory,
    pub old_value: String,
    pub new_value: String,
}

/// Trait for survivor comparison rules
pub trait FieldRule: Send + Sync {
    /// Rule identifier
    fn id(&self) -> &str;

    /// Compare one field across two snapshots
    fn compare(&self, previous: &SnapshotField, current: &SnapshotField) -> Option<RawChange>;
}

/// Normalized form used for type comparison
pub fn normalize_type(data_type: &str) -> String {
    data_type.trim().to_ascii_lowercase()
}

/// Declared data type changed
pub struct TypeRule;

impl FieldRule for TypeRule {
    fn id(&self) -> &str {
        "type"
    }

    fn compare(&self, previous: &SnapshotField, current: &SnapshotField) -> Option<RawChange> {
        if normalize_type(&previous.data_type) == normalize_type(&current.data_type) {
            return None;
        }
        Some(RawChange {
            category: ChangeCategory::TypeChanged,
            old_value: previous.data_type.clone(),
            new_value: current.data_type.clone(),
        })
    }
}

/// Nullability flipped in either direction
pub struct NullabilityRule;

impl FieldRule for NullabilityRule {
    fn id(&self) -> &str {
        "nullability"
    }

    fn compare(&self, previous: &SnapshotField, current: &SnapshotField) -> Option<RawChange> {
        let category = match (previous.nullable, current.nullable) {
            (true, false) => ChangeCategory::NullabilityTightened,
            (false, true) => ChangeCategory::NullabilityRelaxed,
            _ => return None,
        };
        Some(RawChange {
            category,
            old_value: nullability(previous.nullable).to_string(),
            new_value: nullability(current.nullable).to_string(),
        })
    }
}

fn nullability(nullable: bool) -> &'static str {
    if nullable {
        "nullable"
    } else {
        "required"
    }
}

/// Declared position moved
pub struct OrdinalRule;

impl FieldRule for OrdinalRule {
    fn id(&self) -> &str {
        "ordinal"
    }

    fn compare(&self, previous: &SnapshotField, current: &SnapshotField) -> Option<RawChange> {
        if previous.ordinal == current.ordinal {
            return None;
        }
        Some(RawChange {
            category: ChangeCategory::OrdinalChanged,
            old_value: previous.ordinal.to_string(),
            new_value: current.ordinal.to_string(),
        })
    }
}

/// Classify an added field by its shape
pub fn added_category(field: &SnapshotField) -> ChangeCategory {
    if field.nullable {
        ChangeCategory::AddedNullable
    } else if field.has_default {
        ChangeCategory::AddedWithDefault
    } else {
        ChangeCategory::AddedRequired
    }
}

/// Classify a removed field by its shape
pub fn removed_category(field: &SnapshotField) -> ChangeCategory {
    if field.nullable {
        ChangeCategory::RemovedNullable
    } else {
        ChangeCategory::RemovedRequired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::FieldSpec;
    use uuid::Uuid;

    fn field(name: &str, ty: &str, nullable: bool, ordinal: u32) -> SnapshotField {
        SnapshotField::copy_of(Uuid::nil(), &FieldSpec::new(name, ty, nullable, ordinal))
    }

    #[test]
    fn test_type_compared_case_insensitively() {
        assert!(TypeRule.compare(&field("id", "INT", false, 0), &field("id", " int ", false, 0)).is_none());
        let change = TypeRule
            .compare(&field("id", "int", false, 0), &field("id", "string", false, 0))
            .unwrap();
        assert_eq!(change.old_value, "int");
        assert_eq!(change.new_value, "string");
    }

    #[test]
    fn test_nullability_direction() {
        let tightened = NullabilityRule
            .compare(&field("a", "int", true, 0), &field("a", "int", false, 0))
            .unwrap();
        assert_eq!(tightened.category, ChangeCategory::NullabilityTightened);

        let relaxed = NullabilityRule
            .compare(&field("a", "int", false, 0), &field("a", "int", true, 0))
            .unwrap();
        assert_eq!(relaxed.category, ChangeCategory::NullabilityRelaxed);
    }

    #[test]
    fn test_added_with_default() {
        let spec = FieldSpec::new("status", "string", false, 3).with_default();
        let added = SnapshotField::copy_of(Uuid::nil(), &spec);
        assert_eq!(added_category(&added), ChangeCategory::AddedWithDefault);
        assert_eq!(added_category(&field("x", "int", false, 0)), ChangeCategory::AddedRequired);
    }
}
