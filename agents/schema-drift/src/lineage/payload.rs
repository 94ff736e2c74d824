//! Canonical snapshot payload produced by connectors
//!
//! Payloads describe shape only. Any key that could carry sample values is
//! rejected wherever it appears in the document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::contracts::{Component, ComponentKind, FieldSpec};
use crate::error::{DriftError, Result};

/// Keys that would smuggle data values into a snapshot
pub const FORBIDDEN_SNAPSHOT_KEYS: [&str; 6] =
    ["sample_rows", "rows", "data", "example_values", "example", "samples"];

/// Connector output: component identity plus an ordered field list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPayload {
    pub component: String,

    #[serde(default = "default_kind")]
    pub kind: ComponentKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,

    pub fields: Vec<FieldSpec>,
}

fn default_kind() -> ComponentKind {
    ComponentKind::File
}

impl CanonicalPayload {
    /// Parse and guard a JSON payload
    pub fn from_json(raw: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(raw)?;
        ensure_shape_only(&document)?;
        Ok(serde_json::from_value(document)?)
    }

    /// Read a payload file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DriftError::validation(format!("cannot read payload {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Component described by this payload
    pub fn component(&self) -> Component {
        let component = Component::new(self.component.clone(), self.kind);
        match &self.locator {
            Some(locator) => component.with_locator(locator.clone()),
            None => component,
        }
    }
}

/// Reject documents containing any forbidden key at any depth
pub fn ensure_shape_only(document: &serde_json::Value) -> Result<()> {
    match document {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                if FORBIDDEN_SNAPSHOT_KEYS.contains(&key.as_str()) {
                    return Err(DriftError::validation(format!(
                        "forbidden key '{}' in snapshot payload",
                        key
                    )));
                }
                ensure_shape_only(value)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => items.iter().try_for_each(ensure_shape_only),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_connector_payload() {
        let payload = CanonicalPayload::from_json(
            r#"{
                "component": "customers.csv",
                "kind": "file",
                "locator": "/data/customers.csv",
                "fields": [
                    {"name": "name", "type": "string", "nullable": false, "ordinal": 0},
                    {"name": "age", "type": "int", "ordinal": 1, "hints": {"format": "integer"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(payload.fields.len(), 2);
        assert!(payload.fields[1].nullable);
        assert_eq!(payload.fields[1].hints.get("format").map(String::as_str), Some("integer"));
        assert_eq!(payload.component().locator.as_deref(), Some("/data/customers.csv"));
    }

    #[test]
    fn test_nested_sample_rows_rejected() {
        let err = CanonicalPayload::from_json(
            r#"{
                "component": "customers.csv",
                "fields": [
                    {"name": "name", "type": "string", "hints": {"samples": ["alice"]}}
                ]
            }"#,
        )
        .unwrap_err();

        assert!(matches!(err, DriftError::Validation(_)));
        assert!(err.to_string().contains("samples"));
    }

    #[test]
    fn test_top_level_rows_rejected() {
        let err = CanonicalPayload::from_json(r#"{"component": "c", "fields": [], "rows": []}"#)
            .unwrap_err();
        assert!(err.is_user_error());
    }
}
