//! Heuristic rename pairing
//!
//! A removed and an added field pair up when type and nullability match
//! exactly. Pairing only annotates: every candidate is listed on both sides
//! and a `renamed` record is emitted for unambiguous one-to-one pairs. The
//! literal `added`/`removed` records are never dropped.

use super::rules::normalize_type;
use crate::contracts::SnapshotField;

/// Candidate partners for each removed and added field
#[derive(Debug, Default)]
pub struct RenameCandidates {
    /// Parallel to the removed list: names of matching added fields
    pub for_removed: Vec<Vec<String>>,
    /// Parallel to the added list: names of matching removed fields
    pub for_added: Vec<Vec<String>>,
    /// `(removed index, added index)` pairs with exactly one candidate each way
    pub unambiguous: Vec<(usize, usize)>,
}

fn same_shape(a: &SnapshotField, b: &SnapshotField) -> bool {
    a.nullable == b.nullable && normalize_type(&a.data_type) == normalize_type(&b.data_type)
}

/// Pair removed with added fields. Both slices keep their ordinal order,
/// so candidate lists come out deterministic.
pub fn pair(removed: &[&SnapshotField], added: &[&SnapshotField]) -> RenameCandidates {
    let mut candidates = RenameCandidates {
        for_removed: vec![Vec::new(); removed.len()],
        for_added: vec![Vec::new(); added.len()],
        unambiguous: Vec::new(),
    };

    let mut matches = Vec::new();
    for (r, old) in removed.iter().enumerate() {
        for (a, new) in added.iter().enumerate() {
            if same_shape(old, new) {
                candidates.for_removed[r].push(new.name.clone());
                candidates.for_added[a].push(old.name.clone());
                matches.push((r, a));
            }
        }
    }

    candidates.unambiguous = matches
        .into_iter()
        .filter(|&(r, a)| candidates.for_removed[r].len() == 1 && candidates.for_added[a].len() == 1)
        .collect();

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::FieldSpec;
    use uuid::Uuid;

    fn field(name: &str, ty: &str, nullable: bool) -> SnapshotField {
        SnapshotField::copy_of(Uuid::nil(), &FieldSpec::new(name, ty, nullable, 0))
    }

    #[test]
    fn test_single_match_is_unambiguous() {
        let old = field("dob", "date", false);
        let new = field("date_of_birth", "DATE", false);
        let result = pair(&[&old], &[&new]);

        assert_eq!(result.unambiguous, vec![(0, 0)]);
        assert_eq!(result.for_removed[0], vec!["date_of_birth"]);
    }

    #[test]
    fn test_ties_are_annotated_not_resolved() {
        let old = field("email", "string", true);
        let a = field("email_primary", "string", true);
        let b = field("email_secondary", "string", true);
        let result = pair(&[&old], &[&a, &b]);

        assert!(result.unambiguous.is_empty());
        assert_eq!(result.for_removed[0], vec!["email_primary", "email_secondary"]);
        assert_eq!(result.for_added[1], vec!["email"]);
    }

    #[test]
    fn test_shape_mismatch_never_pairs() {
        let old = field("id", "int", false);
        let new = field("key", "int", true);
        let result = pair(&[&old], &[&new]);
        assert!(result.for_removed[0].is_empty());
        assert!(result.unambiguous.is_empty());
    }
}
