//! Drift Detection & Classification Engine
//!
//! Deterministic, pure comparison of two snapshots of one component.
//! Identical inputs always yield a byte-identical report: no clocks, no
//! randomness, and every collection walked in ordinal or key order.

mod index;
mod rename;
mod rules;
mod ruleset;

pub use index::TransformationIndex;
pub use rules::*;
pub use ruleset::*;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::contracts::*;
use crate::error::{DriftError, Result};

/// Drift detection engine
pub struct DriftEngine {
    rules: Vec<Box<dyn FieldRule>>,
}

impl Default for DriftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DriftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftEngine")
            .field("rules", &self.rules.iter().map(|r| r.id()).collect::<Vec<_>>())
            .finish()
    }
}

/// A change located but not yet classified
struct Pending<'a> {
    category: ChangeCategory,
    field: &'a str,
    previous_field: Option<&'a str>,
    old_value: Option<String>,
    new_value: Option<String>,
    rename_candidates: Vec<String>,
}

impl DriftEngine {
    /// Create engine with the survivor rules in report order
    pub fn new() -> Self {
        Self {
            rules: vec![Box::new(TypeRule), Box::new(NullabilityRule), Box::new(OrdinalRule)],
        }
    }

    /// Compare `current` against its predecessor.
    ///
    /// `previous = None` means the component has no history yet: zero
    /// changes, severity `low`, not breaking.
    pub fn detect(
        &self,
        current: &Snapshot,
        previous: Option<&Snapshot>,
        index: &TransformationIndex,
        ruleset: &Ruleset,
    ) -> Result<DriftReport> {
        let Some(previous) = previous else {
            return self.finish(current, None, ruleset, Vec::new());
        };

        if previous.component != current.component {
            return Err(DriftError::IncompatibleSnapshots {
                current: current.component.clone(),
                previous: previous.component.clone(),
            });
        }

        let fold = ruleset.case_insensitive_names;
        let previous_fields = by_ordinal(&previous.fields);
        let current_fields = by_ordinal(&current.fields);
        let previous_by_name = keyed(&previous_fields, fold, &previous.component)?;
        let current_by_name = keyed(&current_fields, fold, &current.component)?;

        let mut located: Vec<Pending<'_>> = Vec::new();
        let mut removed: Vec<&SnapshotField> = Vec::new();
        let mut removed_slots: Vec<usize> = Vec::new();

        for old in previous_fields.iter().copied() {
            match current_by_name.get(&name_key(&old.name, fold)) {
                None => {
                    removed_slots.push(located.len());
                    removed.push(old);
                    located.push(Pending {
                        category: removed_category(old),
                        field: &old.name,
                        previous_field: None,
                        old_value: Some(old.data_type.clone()),
                        new_value: None,
                        rename_candidates: Vec::new(),
                    });
                }
                Some(new) => {
                    for rule in &self.rules {
                        if let Some(raw) = rule.compare(old, new) {
                            located.push(Pending {
                                category: raw.category,
                                field: &new.name,
                                previous_field: None,
                                old_value: Some(raw.old_value),
                                new_value: Some(raw.new_value),
                                rename_candidates: Vec::new(),
                            });
                        }
                    }
                }
            }
        }

        let mut added: Vec<&SnapshotField> = Vec::new();
        let mut added_slots: Vec<usize> = Vec::new();
        for new in current_fields.iter().copied() {
            if !previous_by_name.contains_key(&name_key(&new.name, fold)) {
                added_slots.push(located.len());
                added.push(new);
                located.push(Pending {
                    category: added_category(new),
                    field: &new.name,
                    previous_field: None,
                    old_value: None,
                    new_value: Some(new.data_type.clone()),
                    rename_candidates: Vec::new(),
                });
            }
        }

        let renames = rename::pair(&removed, &added);
        for (slot, names) in removed_slots.iter().zip(renames.for_removed) {
            located[*slot].rename_candidates = names;
        }
        for (slot, names) in added_slots.iter().zip(renames.for_added) {
            located[*slot].rename_candidates = names;
        }
        for (r, a) in renames.unambiguous {
            located.push(Pending {
                category: ChangeCategory::Renamed,
                field: &added[a].name,
                previous_field: Some(&removed[r].name),
                old_value: Some(removed[r].name.clone()),
                new_value: Some(added[a].name.clone()),
                rename_candidates: Vec::new(),
            });
        }

        let changes = located
            .into_iter()
            .map(|pending| classify(&current.component, pending, index, ruleset))
            .collect::<Result<Vec<_>>>()?;

        self.finish(current, Some(previous), ruleset, changes)
    }

    fn finish(
        &self,
        current: &Snapshot,
        previous: Option<&Snapshot>,
        ruleset: &Ruleset,
        changes: Vec<FieldChange>,
    ) -> Result<DriftReport> {
        let previous_id = previous.map(|p| p.id);
        let severity = changes.iter().map(|c| c.severity).max().unwrap_or_default();
        let breaking = changes.iter().any(|c| c.breaking)
            || (ruleset.strict && changes.iter().any(|c| c.severity >= Severity::Medium));
        let summary = match previous {
            Some(previous) => summarize(previous, current, &changes, severity, breaking),
            None => format!("{} {}: first snapshot, no baseline", current.component, current.version),
        };
        let fingerprint = fingerprint(current, previous_id, ruleset, &changes)?;

        Ok(DriftReport {
            component: current.component.clone(),
            current_snapshot_id: current.id,
            previous_snapshot_id: previous_id,
            ruleset_id: ruleset.id.clone(),
            changes,
            severity,
            breaking,
            summary,
            fingerprint,
        })
    }
}

fn by_ordinal(fields: &[SnapshotField]) -> Vec<&SnapshotField> {
    let mut ordered: Vec<&SnapshotField> = fields.iter().collect();
    ordered.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));
    ordered
}

fn name_key(name: &str, fold: bool) -> String {
    if fold {
        name.to_ascii_lowercase()
    } else {
        name.to_string()
    }
}

fn keyed<'a>(
    fields: &[&'a SnapshotField],
    fold: bool,
    component: &str,
) -> Result<BTreeMap<String, &'a SnapshotField>> {
    let mut map = BTreeMap::new();
    for field in fields {
        if map.insert(name_key(&field.name, fold), *field).is_some() {
            return Err(DriftError::validation(format!(
                "field '{}' of '{}' collides with another field when names ignore case",
                field.name, component
            )));
        }
    }
    Ok(map)
}

fn classify(
    component: &str,
    pending: Pending<'_>,
    index: &TransformationIndex,
    ruleset: &Ruleset,
) -> Result<FieldChange> {
    let fold = ruleset.case_insensitive_names;
    let rule = ruleset.rule(pending.category)?;
    let impacted = index.is_impacted(component, pending.field, fold)
        || pending
            .previous_field
            .map(|name| index.is_impacted(component, name, fold))
            .unwrap_or(false);
    let severity = if impacted { rule.severity.escalate() } else { rule.severity };

    Ok(FieldChange {
        kind: pending.category.kind(),
        category: pending.category,
        field: pending.field.to_string(),
        previous_field: pending.previous_field.map(str::to_string),
        old_value: pending.old_value,
        new_value: pending.new_value,
        transformation_impacted: impacted,
        baseline_severity: rule.severity,
        severity,
        breaking: rule.breaking,
        rename_candidates: pending.rename_candidates,
    })
}

fn summarize(
    previous: &Snapshot,
    current: &Snapshot,
    changes: &[FieldChange],
    severity: Severity,
    breaking: bool,
) -> String {
    let head = format!("{} {} -> {}", current.component, previous.version, current.version);
    if changes.is_empty() {
        return format!("{}: no drift", head);
    }

    let mut counts: BTreeMap<ChangeKind, usize> = BTreeMap::new();
    for change in changes {
        *counts.entry(change.kind).or_default() += 1;
    }
    let breakdown: Vec<String> = counts
        .iter()
        .map(|(kind, n)| format!("{}={}", kind.as_str(), n))
        .collect();
    let impacted = changes.iter().filter(|c| c.transformation_impacted).count();

    format!(
        "{}: {} change(s) ({}); {} impacted; severity {}; {}",
        head,
        changes.len(),
        breakdown.join(", "),
        impacted,
        severity,
        if breaking { "breaking" } else { "non-breaking" }
    )
}

fn fingerprint(
    current: &Snapshot,
    previous_id: Option<SnapshotId>,
    ruleset: &Ruleset,
    changes: &[FieldChange],
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(current.component.as_bytes());
    hasher.update(current.id.as_bytes());
    match previous_id {
        Some(id) => hasher.update(id.as_bytes()),
        None => hasher.update(b"none"),
    }
    hasher.update(ruleset.id.as_bytes());
    hasher.update(serde_json::to_vec(changes)?);
    Ok(hex::encode(hasher.finalize()))
}
