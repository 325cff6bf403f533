//! Manifest loading and validation
//!
//! Documents are parsed section by section so a single pass reports every
//! problem it finds. Loading never panics on malformed input.

use crate::error::{ManifestError, ManifestInvalidSchemaError, Result};
use crate::model::{JobOverride, Manifest, ManifestParts, ManifestRule, RiskClass, RuleCondition};
use chrono::{DateTime, Utc};
use rail_types::{Budget, ExecutionMode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Version of the built-in manifest used before any policy is deployed
pub const DEFAULT_MANIFEST_VERSION: &str = "0.0.0-default";

/// Rule id of the built-in catch-all rule
pub const DEFAULT_RULE_ID: &str = "default-direct";

/// Parses and validates manifest documents
pub struct ManifestLoader;

impl ManifestLoader {
    /// Load a manifest from JSON text.
    pub fn load_str(raw: &str) -> std::result::Result<Manifest, ManifestInvalidSchemaError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            warn!(error = %e, "Manifest is not valid JSON");
            ManifestInvalidSchemaError::single(format!("invalid JSON: {}", e))
        })?;
        Self::load_value(value)
    }

    /// Load a manifest from a JSON file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::load_str(&raw)?)
    }

    /// Load a manifest from an already-parsed document.
    pub fn load_value(value: Value) -> std::result::Result<Manifest, ManifestInvalidSchemaError> {
        let doc = match value {
            Value::Object(doc) => doc,
            other => {
                return Err(ManifestInvalidSchemaError::single(format!(
                    "manifest must be a JSON object, got {}",
                    json_type(&other)
                )))
            }
        };

        let mut errors = Vec::new();

        let manifest_id: Option<String> = optional(&doc, "manifest_id", &mut errors);
        let created_at: Option<DateTime<Utc>> = optional(&doc, "created_at", &mut errors);
        let version: Option<String> = required(&doc, "version", &mut errors);
        let hash_prev: Option<String> = optional(&doc, "hash_prev", &mut errors);
        let declared_hash: Option<String> = optional(&doc, "hash_self", &mut errors);
        let budget_defaults: Option<Budget> = required(&doc, "budget_defaults", &mut errors);
        let shadow_mode: bool = optional(&doc, "shadow_mode", &mut errors).unwrap_or(false);

        let rules = parse_rules(&doc, &mut errors);
        let risk_classes = parse_risk_classes(&doc, &mut errors);
        let job_overrides = parse_job_overrides(&doc, &mut errors);

        if let Some(version) = &version {
            if version.trim().is_empty() {
                errors.push("`version` must not be empty".to_string());
            }
        }
        if let Some(hash_prev) = &hash_prev {
            if hash_prev.trim().is_empty() {
                errors.push("`hash_prev` must not be empty when present".to_string());
            }
        }

        // Cross-references are only meaningful once the risk classes parsed
        for rule in &rules {
            if let Some(class) = &rule.condition.risk_class {
                if !risk_classes.contains_key(class) {
                    errors.push(format!(
                        "rule `{}` references unknown risk class `{}`",
                        rule.rule_id, class
                    ));
                }
            }
        }
        for (job_type, job_override) in &job_overrides {
            if let Some(class) = &job_override.risk_class {
                if !risk_classes.contains_key(class) {
                    errors.push(format!(
                        "job override `{}` references unknown risk class `{}`",
                        job_type, class
                    ));
                }
            }
        }

        let (version, budget_defaults) = match (version, budget_defaults) {
            (Some(version), Some(budget_defaults)) if errors.is_empty() => {
                (version, budget_defaults)
            }
            _ => {
                warn!(errors = errors.len(), "Manifest failed validation");
                return Err(ManifestInvalidSchemaError::new(errors));
            }
        };

        let manifest = Manifest::from_parts(ManifestParts {
            manifest_id,
            created_at,
            version,
            hash_prev,
            rules,
            budget_defaults,
            risk_classes,
            job_overrides,
            shadow_mode,
        })
        .map_err(|e| ManifestInvalidSchemaError::single(format!("unhashable content: {}", e)))?;

        if let Some(declared) = declared_hash {
            if declared != manifest.hash_self() {
                return Err(ManifestInvalidSchemaError::single(format!(
                    "declared hash_self {} does not match content hash {}",
                    declared,
                    manifest.hash_self()
                )));
            }
        }

        debug!(
            version = %manifest.version(),
            hash = %manifest.hash_self(),
            rules = manifest.rules().len(),
            "Manifest loaded"
        );

        Ok(manifest)
    }
}

/// Load a manifest from JSON text.
pub fn load_manifest(raw: &str) -> std::result::Result<Manifest, ManifestInvalidSchemaError> {
    ManifestLoader::load_str(raw)
}

/// Minimal safe manifest: a single catch-all rule running everything DIRECT.
pub fn create_default_manifest() -> Manifest {
    let parts = ManifestParts {
        manifest_id: None,
        created_at: None,
        version: DEFAULT_MANIFEST_VERSION.to_string(),
        hash_prev: None,
        rules: vec![ManifestRule {
            rule_id: DEFAULT_RULE_ID.to_string(),
            priority: i64::MAX,
            condition: RuleCondition::any(),
            mode: ExecutionMode::Direct,
            budget_override: None,
            recovery_strategy: None,
            reason: "no governance policy deployed".to_string(),
            enabled: true,
        }],
        budget_defaults: Budget::default(),
        risk_classes: BTreeMap::new(),
        job_overrides: BTreeMap::new(),
        shadow_mode: false,
    };

    let mut manifest = Manifest::unhashed(parts);
    // Plain strings and integers always serialize
    manifest.hash_self = manifest.compute_hash().unwrap_or_default();
    manifest
}

fn parse_rules(doc: &Map<String, Value>, errors: &mut Vec<String>) -> Vec<ManifestRule> {
    let raw: Vec<Value> = match required(doc, "rules", errors) {
        Some(raw) => raw,
        None => return Vec::new(),
    };

    let mut rules = Vec::with_capacity(raw.len());
    let mut seen = HashSet::new();
    for (i, value) in raw.iter().enumerate() {
        match ManifestRule::deserialize(value) {
            Ok(rule) => {
                if rule.rule_id.trim().is_empty() {
                    errors.push(format!("rules[{}]: `rule_id` must not be empty", i));
                } else if !seen.insert(rule.rule_id.clone()) {
                    errors.push(format!("rules[{}]: duplicate rule_id `{}`", i, rule.rule_id));
                }
                rules.push(rule);
            }
            Err(e) => errors.push(format!("rules[{}]: {}", i, e)),
        }
    }
    rules
}

fn parse_risk_classes(
    doc: &Map<String, Value>,
    errors: &mut Vec<String>,
) -> BTreeMap<String, RiskClass> {
    let raw: BTreeMap<String, Value> = optional(doc, "risk_classes", errors).unwrap_or_default();

    let mut classes = BTreeMap::new();
    for (key, value) in raw {
        match RiskClass::deserialize(&value) {
            Ok(mut class) => {
                if class.name.is_empty() {
                    class.name = key.clone();
                } else if class.name != key {
                    errors.push(format!(
                        "risk_classes.{}: name `{}` does not match its key",
                        key, class.name
                    ));
                }
                if !class.budget_multiplier.is_finite() || class.budget_multiplier < 0.0 {
                    errors.push(format!(
                        "risk_classes.{}: budget_multiplier must be a finite number >= 0, got {}",
                        key, class.budget_multiplier
                    ));
                }
                classes.insert(key, class);
            }
            Err(e) => errors.push(format!("risk_classes.{}: {}", key, e)),
        }
    }
    classes
}

fn parse_job_overrides(
    doc: &Map<String, Value>,
    errors: &mut Vec<String>,
) -> BTreeMap<String, JobOverride> {
    let raw: BTreeMap<String, Value> = optional(doc, "job_overrides", errors).unwrap_or_default();

    let mut overrides = BTreeMap::new();
    for (job_type, value) in raw {
        if let Value::Object(fields) = &value {
            for field in fields.keys() {
                if !JobOverride::FIELDS.contains(&field.as_str()) {
                    errors.push(format!("job_overrides.{}: unknown field `{}`", job_type, field));
                }
            }
        }
        match JobOverride::deserialize(&value) {
            Ok(job_override) => {
                overrides.insert(job_type, job_override);
            }
            Err(e) => errors.push(format!("job_overrides.{}: {}", job_type, e)),
        }
    }
    overrides
}

fn required<T: DeserializeOwned>(
    doc: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    match doc.get(key) {
        None | Some(Value::Null) => {
            errors.push(format!("missing required field `{}`", key));
            None
        }
        Some(value) => decode(key, value, errors),
    }
}

fn optional<T: DeserializeOwned>(
    doc: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    match doc.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => decode(key, value, errors),
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &Value, errors: &mut Vec<String>) -> Option<T> {
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            errors.push(format!("`{}`: {}", key, e));
            None
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "version": "1.0.0",
            "budget_defaults": Budget::default(),
            "rules": [
                {"rule_id": "llm", "priority": 100, "condition": {"job_type": "llm_call"}, "mode": "RAIL"},
                {"rule_id": "catch-all", "priority": 1000, "condition": {}, "mode": "DIRECT"}
            ]
        })
    }

    #[test]
    fn test_load_minimal() {
        let manifest = ManifestLoader::load_value(minimal()).unwrap();
        assert_eq!(manifest.version(), "1.0.0");
        assert_eq!(manifest.rules().len(), 2);
        assert!(manifest.hash_prev().is_none());
        assert!(!manifest.shadow_mode());
        assert_eq!(manifest.hash_self().len(), 64);
        assert!(manifest.rules()[0].enabled);
    }

    #[test]
    fn test_evaluation_order_is_stable_by_priority() {
        let doc = json!({
            "version": "1",
            "budget_defaults": Budget::default(),
            "rules": [
                {"rule_id": "late", "priority": 50, "mode": "DIRECT"},
                {"rule_id": "tie-a", "priority": 10, "mode": "RAIL"},
                {"rule_id": "off", "priority": 1, "mode": "RAIL", "enabled": false},
                {"rule_id": "tie-b", "priority": 10, "mode": "DIRECT"}
            ]
        });
        let manifest = ManifestLoader::load_value(doc).unwrap();
        let order: Vec<&str> = manifest
            .evaluation_order()
            .map(|r| r.rule_id.as_str())
            .collect();
        assert_eq!(order, vec!["tie-a", "tie-b", "late"]);
    }

    #[test]
    fn test_collects_every_error() {
        let doc = json!({
            "version": "",
            "rules": [
                {"rule_id": "a", "priority": 1, "mode": "RAIL"},
                {"rule_id": "a", "priority": 2, "mode": "DIRECT"},
                {"rule_id": "b", "priority": 3, "mode": "SOMETIMES"},
                {"rule_id": "c", "priority": 4, "mode": "RAIL", "condition": {"job_typ": "x"}}
            ],
            "risk_classes": {
                "pii": {"name": "personal", "budget_multiplier": -1.0}
            },
            "job_overrides": {
                "export": {"timeout_ms": 10, "risk_class": "unknown"}
            }
        });

        let err = ManifestLoader::load_value(doc).unwrap_err();
        let joined = err.validation_errors.join("\n");
        assert!(joined.contains("missing required field `budget_defaults`"));
        assert!(joined.contains("`version` must not be empty"));
        assert!(joined.contains("duplicate rule_id `a`"));
        assert!(joined.contains("rules[2]"));
        assert!(joined.contains("rules[3]"));
        assert!(joined.contains("does not match its key"));
        assert!(joined.contains("budget_multiplier"));
        assert!(joined.contains("unknown risk class `unknown`"));
        assert!(err.validation_errors.len() >= 8);
    }

    #[test]
    fn test_unknown_risk_class_in_condition() {
        let mut doc = minimal();
        doc["rules"][0]["condition"]["risk_class"] = json!("ghost");
        let err = ManifestLoader::load_value(doc).unwrap_err();
        assert_eq!(err.validation_errors.len(), 1);
        assert!(err.validation_errors[0].contains("ghost"));
    }

    #[test]
    fn test_unknown_job_override_field() {
        let mut doc = minimal();
        doc["job_overrides"] = json!({"export": {"timeout": 10}});
        let err = ManifestLoader::load_value(doc).unwrap_err();
        assert!(err.validation_errors[0].contains("unknown field `timeout`"));
    }

    #[test]
    fn test_malformed_input_never_panics() {
        for raw in ["", "null", "[]", "42", "{", r#"{"rules": "nope"}"#] {
            assert!(ManifestLoader::load_str(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_risk_class_name_defaults_to_key() {
        let mut doc = minimal();
        doc["risk_classes"] = json!({"pii": {"require_approval": true}});
        let manifest = ManifestLoader::load_value(doc).unwrap();
        let class = manifest.risk_class("pii").unwrap();
        assert_eq!(class.name, "pii");
        assert_eq!(class.budget_multiplier, 1.0);
        assert!(class.require_approval);
    }

    #[test]
    fn test_declared_hash_is_checked() {
        let mut doc = minimal();
        doc["hash_self"] = json!("deadbeef");
        assert!(ManifestLoader::load_value(doc).is_err());

        let manifest = ManifestLoader::load_value(minimal()).unwrap();
        let mut doc = minimal();
        doc["hash_self"] = json!(manifest.hash_self());
        assert!(ManifestLoader::load_value(doc).is_ok());
    }

    #[test]
    fn test_document_round_trip_keeps_hash() {
        let mut doc = minimal();
        doc["manifest_id"] = json!("m-1");
        doc["created_at"] = json!("2026-01-01T00:00:00Z");
        doc["risk_classes"] = json!({"pii": {"budget_multiplier": 2.0, "recovery_strategy": "escalate"}});
        doc["job_overrides"] = json!({"export": {"timeout_ms": 5000, "risk_class": "pii"}});

        let manifest = ManifestLoader::load_value(doc).unwrap();
        let reloaded = ManifestLoader::load_value(manifest.to_document().unwrap()).unwrap();
        assert_eq!(manifest.hash_self(), reloaded.hash_self());
        assert_eq!(reloaded.manifest_id(), Some("m-1"));
    }

    #[test]
    fn test_metadata_excluded_from_hash() {
        let plain = ManifestLoader::load_value(minimal()).unwrap();
        let mut doc = minimal();
        doc["manifest_id"] = json!("another-id");
        doc["created_at"] = json!("2030-06-01T12:00:00Z");
        let tagged = ManifestLoader::load_value(doc).unwrap();
        assert_eq!(plain.hash_self(), tagged.hash_self());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, minimal().to_string()).unwrap();

        let manifest = ManifestLoader::load_file(&path).unwrap();
        assert_eq!(manifest.version(), "1.0.0");

        let missing = ManifestLoader::load_file(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ManifestError::Io { .. })));
    }

    #[test]
    fn test_default_manifest() {
        let manifest = create_default_manifest();
        assert_eq!(manifest.version(), DEFAULT_MANIFEST_VERSION);
        assert_eq!(manifest.rules().len(), 1);

        let rule = &manifest.rules()[0];
        assert_eq!(rule.priority, i64::MAX);
        assert!(rule.condition.is_empty());
        assert_eq!(rule.mode, ExecutionMode::Direct);
        assert_eq!(manifest.hash_self(), manifest.compute_hash().unwrap());
    }
}
