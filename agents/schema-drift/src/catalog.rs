//! Read-only pipeline catalog
//!
//! Resolves pipelines (with their embedded policies and mappings),
//! components and severity rulesets. The engine and orchestrator only see
//! the [`PipelineCatalog`] trait, so tests run without a live store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::contracts::{Component, Pipeline};
use crate::engine::Ruleset;
use crate::error::{DriftError, Result};

/// Read-only repository of pipeline metadata
pub trait PipelineCatalog: Send + Sync {
    /// Pipeline by id
    fn pipeline(&self, id: &str) -> Result<Pipeline>;

    /// Severity ruleset by id
    fn ruleset(&self, id: &str) -> Result<Ruleset>;

    /// Registered component by name
    fn component(&self, name: &str) -> Result<Component>;

    /// Ids of pipelines that consume or produce `component`, sorted
    fn pipelines_using(&self, component: &str) -> Result<Vec<String>>;
}

/// On-disk catalog layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub components: Vec<Component>,

    #[serde(default)]
    pub pipelines: Vec<Pipeline>,

    #[serde(default)]
    pub rulesets: Vec<Ruleset>,
}

/// Catalog held in memory, typically loaded from a YAML/JSON/TOML file
#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    components: BTreeMap<String, Component>,
    pipelines: BTreeMap<String, Pipeline>,
    rulesets: BTreeMap<String, Ruleset>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    /// Empty catalog holding only the built-in rulesets
    pub fn new() -> Self {
        let rulesets = [Ruleset::baseline(), Ruleset::strict()]
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        Self {
            components: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            rulesets,
        }
    }

    /// Load a catalog file; the format follows the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DriftError::Config(format!("cannot read catalog {}: {}", path.display(), e)))?;

        let document: CatalogDocument = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            Some("json") => serde_json::from_str(&raw)?,
            Some("toml") => toml::from_str(&raw)?,
            other => {
                return Err(DriftError::Config(format!(
                    "unsupported catalog format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        let catalog = Self::from_document(document)?;
        info!(
            path = %path.display(),
            pipelines = catalog.pipelines.len(),
            components = catalog.components.len(),
            rulesets = catalog.rulesets.len(),
            "Loaded pipeline catalog"
        );
        Ok(catalog)
    }

    /// Build and cross-check a catalog
    pub fn from_document(document: CatalogDocument) -> Result<Self> {
        let mut catalog = Self::new();
        for ruleset in document.rulesets {
            catalog = catalog.with_ruleset(ruleset)?;
        }
        for component in document.components {
            catalog = catalog.with_component(component)?;
        }
        for pipeline in document.pipelines {
            catalog = catalog.with_pipeline(pipeline)?;
        }
        Ok(catalog)
    }

    /// Register a component
    pub fn with_component(mut self, component: Component) -> Result<Self> {
        if component.name.trim().is_empty() {
            return Err(DriftError::Config("component name must not be empty".into()));
        }
        if self.components.contains_key(&component.name) {
            return Err(DriftError::Config(format!("duplicate component '{}'", component.name)));
        }
        self.components.insert(component.name.clone(), component);
        Ok(self)
    }

    /// Register a custom ruleset; omitted rows inherit the baseline
    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Result<Self> {
        if self.rulesets.contains_key(&ruleset.id) {
            return Err(DriftError::Config(format!("duplicate ruleset '{}'", ruleset.id)));
        }
        let ruleset = ruleset.with_baseline_rows();
        ruleset.validate()?;
        self.rulesets.insert(ruleset.id.clone(), ruleset);
        Ok(self)
    }

    /// Register a pipeline. Components and the policy's ruleset must
    /// already be known.
    pub fn with_pipeline(mut self, mut pipeline: Pipeline) -> Result<Self> {
        if self.pipelines.contains_key(&pipeline.id) {
            return Err(DriftError::Config(format!("duplicate pipeline '{}'", pipeline.id)));
        }
        for name in pipeline.sources.iter().chain(pipeline.targets.iter()) {
            if !self.components.contains_key(name) {
                return Err(DriftError::Config(format!(
                    "pipeline '{}' references unknown component '{}'",
                    pipeline.id, name
                )));
            }
        }
        if !self.rulesets.contains_key(&pipeline.policy.severity_ruleset) {
            return Err(DriftError::Config(format!(
                "pipeline '{}' selects unknown ruleset '{}'",
                pipeline.id, pipeline.policy.severity_ruleset
            )));
        }

        for mapping in pipeline.mappings.iter_mut() {
            if mapping.pipeline_id.is_empty() {
                mapping.pipeline_id = pipeline.id.clone();
            }
        }
        pipeline.mappings.sort_by_key(|m| m.position);
        if pipeline.name.is_empty() {
            pipeline.name = pipeline.id.clone();
        }

        self.pipelines.insert(pipeline.id.clone(), pipeline);
        Ok(self)
    }
}

impl PipelineCatalog for InMemoryCatalog {
    fn pipeline(&self, id: &str) -> Result<Pipeline> {
        self.pipelines
            .get(id)
            .cloned()
            .ok_or_else(|| DriftError::not_found("pipeline", id))
    }

    fn ruleset(&self, id: &str) -> Result<Ruleset> {
        self.rulesets
            .get(id)
            .cloned()
            .ok_or_else(|| DriftError::not_found("ruleset", id))
    }

    fn component(&self, name: &str) -> Result<Component> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| DriftError::not_found("component", name))
    }

    fn pipelines_using(&self, component: &str) -> Result<Vec<String>> {
        Ok(self
            .pipelines
            .values()
            .filter(|p| p.touches(component))
            .map(|p| p.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ChangeCategory, HealingStrategy, Severity};

    const CATALOG: &str = r#"
components:
  - name: customers.csv
    kind: file
    locator: /data/customers.csv
  - name: warehouse.customers
    kind: database
rulesets:
  - id: relaxed
    rules:
      type_changed: { severity: medium, breaking: false }
pipelines:
  - id: customers-etl
    sources: [customers.csv]
    targets: [warehouse.customers]
    mappings:
      - position: 1
        source: { component: customers.csv, field: age }
        target: { component: warehouse.customers, field: age_bucket }
        expression: bucket(age)
      - position: 0
        source: { component: customers.csv, field: name }
        target: { component: warehouse.customers, field: full_name }
    policy:
      auto_heal_allowed: true
      healing_strategy: patch
      notify_channels: [ops-email]
      severity_ruleset: relaxed
"#;

    fn write(name: &str, body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_yaml_catalog() {
        let (_dir, path) = write("catalog.yaml", CATALOG);
        let catalog = InMemoryCatalog::load(&path).unwrap();

        let pipeline = catalog.pipeline("customers-etl").unwrap();
        assert_eq!(pipeline.name, "customers-etl");
        assert_eq!(pipeline.policy.healing_strategy, HealingStrategy::Patch);
        assert!(pipeline.policy.notify_on_breaking);
        assert_eq!(pipeline.mappings[0].source.field, "name");
        assert!(pipeline.mappings.iter().all(|m| m.pipeline_id == "customers-etl"));

        let relaxed = catalog.ruleset("relaxed").unwrap();
        assert_eq!(relaxed.rule(ChangeCategory::TypeChanged).unwrap().severity, Severity::Medium);
        assert_eq!(
            relaxed.rule(ChangeCategory::RemovedRequired).unwrap().severity,
            Severity::High
        );

        assert_eq!(catalog.pipelines_using("warehouse.customers").unwrap(), vec!["customers-etl"]);
    }

    #[test]
    fn test_load_json_catalog() {
        let body = r#"{"components":[{"name":"events","kind":"api"}],
                       "pipelines":[{"id":"events-sync","sources":["events"]}]}"#;
        let (_dir, path) = write("catalog.json", body);
        let catalog = InMemoryCatalog::load(&path).unwrap();
        assert_eq!(catalog.pipeline("events-sync").unwrap().policy.severity_ruleset, "default");
    }

    #[test]
    fn test_unknown_references_rejected() {
        let document = CatalogDocument {
            pipelines: vec![serde_json::from_str(r#"{"id":"p","sources":["ghost"]}"#).unwrap()],
            ..Default::default()
        };
        assert!(matches!(
            InMemoryCatalog::from_document(document),
            Err(DriftError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_pipeline_not_found() {
        let err = InMemoryCatalog::new().pipeline("nope").unwrap_err();
        assert!(matches!(err, DriftError::NotFound { kind: "pipeline", .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let (_dir, path) = write("catalog.ini", "");
        assert!(InMemoryCatalog::load(&path).is_err());
    }
}
