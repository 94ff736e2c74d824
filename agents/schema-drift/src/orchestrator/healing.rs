//! Healing plan derivation

use std::collections::HashSet;

use crate::contracts::*;

/// Action kind recommended for a change
pub fn action_kind(kind: ChangeKind) -> HealingActionKind {
    match kind {
        ChangeKind::Added => HealingActionKind::AddColumn,
        ChangeKind::Removed => HealingActionKind::ManualReview,
        ChangeKind::TypeChanged => HealingActionKind::AlterColumnType,
        ChangeKind::NullabilityChanged => HealingActionKind::AlterNullability,
        ChangeKind::OrdinalChanged => HealingActionKind::ReorderColumn,
        ChangeKind::Renamed => HealingActionKind::RenameColumn,
    }
}

fn describe(component: &str, change: &FieldChange, kind: HealingActionKind) -> String {
    match kind {
        HealingActionKind::AddColumn => format!(
            "add column {}.{} ({})",
            component,
            change.field,
            change.new_value.as_deref().unwrap_or("?")
        ),
        HealingActionKind::AlterColumnType | HealingActionKind::AlterNullability => format!(
            "alter {}.{}: {} -> {}",
            component,
            change.field,
            change.old_value.as_deref().unwrap_or("?"),
            change.new_value.as_deref().unwrap_or("?")
        ),
        HealingActionKind::ReorderColumn => format!(
            "reorder {}.{} to position {}",
            component,
            change.field,
            change.new_value.as_deref().unwrap_or("?")
        ),
        HealingActionKind::RenameColumn => format!(
            "rename {}.{} to {}",
            component,
            change.previous_field.as_deref().unwrap_or("?"),
            change.field
        ),
        HealingActionKind::ManualReview => format!(
            "review removal of {}.{} with downstream owners",
            component, change.field
        ),
    }
}

/// One action per change, in report order, at default confidence.
///
/// A `renamed` record replaces the literal removed/added pair it explains.
pub fn build_plan(reports: &[DriftReport]) -> HealingPlan {
    let mut actions = Vec::new();
    for report in reports {
        let renamed: HashSet<(&str, &str)> = report
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Renamed)
            .filter_map(|c| c.previous_field.as_deref().map(|from| (from, c.field.as_str())))
            .collect();
        let covered = |change: &FieldChange| match change.kind {
            ChangeKind::Removed => renamed.iter().any(|(from, _)| *from == change.field),
            ChangeKind::Added => renamed.iter().any(|(_, to)| *to == change.field),
            _ => false,
        };

        for change in report.changes.iter().filter(|c| !covered(*c)) {
            let kind = action_kind(change.kind);
            actions.push(HealingAction {
                kind,
                component: report.component.clone(),
                field: change.field.clone(),
                change: change.kind,
                confidence: kind.default_confidence(),
                description: describe(&report.component, change, kind),
            });
        }
    }
    HealingPlan { actions }
}
