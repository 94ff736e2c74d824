//! Severity rulesets
//!
//! A ruleset is a table keyed by change category. The engine never decides
//! severity itself; it only looks rows up here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contracts::{ChangeCategory, Severity};
use crate::error::{DriftError, Result};

/// Identifier of the built-in baseline table
pub const DEFAULT_RULESET: &str = "default";

/// Identifier of the built-in strict table
pub const STRICT_RULESET: &str = "strict";

/// One row of a ruleset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub severity: Severity,
    pub breaking: bool,
}

impl SeverityRule {
    pub const fn new(severity: Severity, breaking: bool) -> Self {
        Self { severity, breaking }
    }
}

/// Externally supplied severity table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Identifier referenced by `Policy::severity_ruleset`
    pub id: String,

    /// Any medium-or-above change makes the report breaking
    #[serde(default)]
    pub strict: bool,

    /// Match field names ignoring ASCII case
    #[serde(default)]
    pub case_insensitive_names: bool,

    /// Category rows. Rows omitted by a catalog file inherit the baseline.
    #[serde(default)]
    pub rules: BTreeMap<ChangeCategory, SeverityRule>,
}

impl Ruleset {
    /// Baseline table
    pub fn baseline() -> Self {
        use ChangeCategory::*;
        use Severity::*;

        let rules = [
            (RemovedRequired, SeverityRule::new(High, true)),
            (RemovedNullable, SeverityRule::new(Medium, false)),
            (AddedRequired, SeverityRule::new(High, true)),
            (AddedWithDefault, SeverityRule::new(Low, false)),
            (AddedNullable, SeverityRule::new(Low, false)),
            (TypeChanged, SeverityRule::new(High, true)),
            (NullabilityTightened, SeverityRule::new(Medium, true)),
            (NullabilityRelaxed, SeverityRule::new(Low, false)),
            (OrdinalChanged, SeverityRule::new(Low, false)),
            (Renamed, SeverityRule::new(Low, false)),
        ]
        .into_iter()
        .collect();

        Self {
            id: DEFAULT_RULESET.to_string(),
            strict: false,
            case_insensitive_names: false,
            rules,
        }
    }

    /// Baseline rows with strict evaluation
    pub fn strict() -> Self {
        Self {
            id: STRICT_RULESET.to_string(),
            strict: true,
            ..Self::baseline()
        }
    }

    /// Built-in table by id
    pub fn builtin(id: &str) -> Option<Self> {
        match id {
            DEFAULT_RULESET => Some(Self::baseline()),
            STRICT_RULESET => Some(Self::strict()),
            _ => None,
        }
    }

    /// Fill rows missing from a catalog-supplied table from the baseline
    pub fn with_baseline_rows(mut self) -> Self {
        for (category, rule) in Self::baseline().rules {
            self.rules.entry(category).or_insert(rule);
        }
        self
    }

    /// Check that every category has a row
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DriftError::Config("ruleset id must not be empty".into()));
        }
        let missing: Vec<&str> = ChangeCategory::ALL
            .iter()
            .filter(|c| !self.rules.contains_key(c))
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(DriftError::Config(format!(
                "ruleset '{}' has no rows for: {}",
                self.id,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Row for a category
    pub fn rule(&self, category: ChangeCategory) -> Result<SeverityRule> {
        self.rules.get(&category).copied().ok_or_else(|| {
            DriftError::Config(format!(
                "ruleset '{}' has no row for {}",
                self.id,
                category.as_str()
            ))
        })
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::baseline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_complete() {
        Ruleset::baseline().validate().unwrap();
        Ruleset::strict().validate().unwrap();
        assert!(Ruleset::builtin("strict").unwrap().strict);
        assert!(Ruleset::builtin("lenient").is_none());
    }

    #[test]
    fn test_partial_table_inherits_baseline() {
        let ruleset: Ruleset = serde_yaml::from_str(
            r#"
id: warehouse
strict: true
rules:
  ordinal_changed:
    severity: medium
    breaking: true
"#,
        )
        .unwrap();

        assert!(ruleset.validate().is_err());
        let ruleset = ruleset.with_baseline_rows();
        ruleset.validate().unwrap();
        assert_eq!(
            ruleset.rule(ChangeCategory::OrdinalChanged).unwrap(),
            SeverityRule::new(Severity::Medium, true)
        );
        assert_eq!(
            ruleset.rule(ChangeCategory::TypeChanged).unwrap(),
            SeverityRule::new(Severity::High, true)
        );
    }
}
