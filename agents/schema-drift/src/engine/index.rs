//! Transformation dependency index

use std::collections::BTreeMap;

use crate::contracts::{FieldRef, TransformationMapping};

/// Field -> mappings that read or write it
#[derive(Debug, Clone, Default)]
pub struct TransformationIndex {
    entries: BTreeMap<FieldRef, Vec<TransformationMapping>>,
}

impl TransformationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every mapping under both its source and its target field
    pub fn from_mappings<'a>(mappings: impl IntoIterator<Item = &'a TransformationMapping>) -> Self {
        let mut index = Self::new();
        for mapping in mappings {
            index.insert(mapping.clone());
        }
        index
    }

    pub fn insert(&mut self, mapping: TransformationMapping) {
        if mapping.source != mapping.target {
            self.entries
                .entry(mapping.target.clone())
                .or_default()
                .push(mapping.clone());
        }
        self.entries.entry(mapping.source.clone()).or_default().push(mapping);
    }

    /// Mappings touching `component.field`
    pub fn mappings_for(&self, component: &str, field: &str) -> &[TransformationMapping] {
        self.entries
            .get(&FieldRef::new(component, field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `component.field` appears as a mapping source or target
    pub fn is_impacted(&self, component: &str, field: &str, ignore_case: bool) -> bool {
        if ignore_case {
            self.entries
                .keys()
                .any(|r| r.component == component && r.field.eq_ignore_ascii_case(field))
        } else {
            !self.mappings_for(component, field).is_empty()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(source: &str, target: &str) -> TransformationMapping {
        TransformationMapping {
            pipeline_id: "p".into(),
            position: 0,
            source: FieldRef::new("customers", source),
            target: FieldRef::new("warehouse", target),
            expression: format!("upper({})", source),
            description: String::new(),
        }
    }

    #[test]
    fn test_source_and_target_indexed() {
        let mappings = vec![mapping("name", "full_name"), mapping("name", "display_name")];
        let index = TransformationIndex::from_mappings(&mappings);

        assert_eq!(index.mappings_for("customers", "name").len(), 2);
        assert!(index.is_impacted("warehouse", "full_name", false));
        assert!(!index.is_impacted("customers", "full_name", false));
        assert!(index.is_impacted("customers", "NAME", true));
        assert!(!index.is_impacted("customers", "NAME", false));
    }
}
