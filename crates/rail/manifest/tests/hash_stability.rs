//! Property tests: `hash_self` depends on manifest content only.

use proptest::prelude::*;
use rail_manifest::ManifestLoader;
use rail_types::Budget;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn arb_rule(index: usize) -> impl Strategy<Value = Value> {
    (
        -1000i64..1000,
        prop::option::of(prop_oneof![Just("llm_call"), Just("cleanup"), Just("export")]),
        any::<bool>(),
        "[a-z ]{0,20}",
    )
        .prop_map(move |(priority, job_type, rail, reason)| {
            json!({
                "rule_id": format!("rule-{}", index),
                "priority": priority,
                "condition": {"job_type": job_type},
                "mode": if rail { "RAIL" } else { "DIRECT" },
                "reason": reason,
            })
        })
}

fn arb_rules() -> impl Strategy<Value = Vec<Value>> {
    (1usize..6).prop_flat_map(|n| (0..n).map(arb_rule).collect::<Vec<_>>())
}

fn arb_risk_classes() -> impl Strategy<Value = Vec<(String, f64, bool)>> {
    prop::collection::btree_map("[a-z]{2,8}", (0u32..40, any::<bool>()), 0..5).prop_map(|map| {
        map.into_iter()
            .map(|(name, (tenths, approval))| (name, f64::from(tenths) / 10.0, approval))
            .collect()
    })
}

/// Render a manifest as JSON text with object keys in the given order.
fn render(rules: &[Value], classes: &[(String, f64, bool)], reverse: bool) -> String {
    let mut class_entries: Vec<String> = classes
        .iter()
        .map(|(name, multiplier, approval)| {
            format!(
                r#""{}": {{"require_approval": {}, "budget_multiplier": {:?}}}"#,
                name, approval, multiplier
            )
        })
        .collect();

    let mut top = vec![
        r#""version": "7""#.to_string(),
        format!(r#""rules": {}"#, Value::Array(rules.to_vec())),
        format!(r#""budget_defaults": {}"#, json!(Budget::default())),
        r#""shadow_mode": false"#.to_string(),
    ];

    if reverse {
        class_entries.reverse();
        top.reverse();
    }
    top.push(format!(r#""risk_classes": {{{}}}"#, class_entries.join(", ")));

    format!("{{{}}}", top.join(", "))
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Key order in the source document never affects the hash.
    #[test]
    fn hash_independent_of_key_order(rules in arb_rules(), classes in arb_risk_classes()) {
        let forward = ManifestLoader::load_str(&render(&rules, &classes, false)).unwrap();
        let backward = ManifestLoader::load_str(&render(&rules, &classes, true)).unwrap();
        prop_assert_eq!(forward.hash_self(), backward.hash_self());
    }

    /// Re-serializing a manifest and loading it again keeps the hash.
    #[test]
    fn hash_survives_reserialization(rules in arb_rules(), classes in arb_risk_classes()) {
        let manifest = ManifestLoader::load_str(&render(&rules, &classes, false)).unwrap();
        let text = serde_json::to_string_pretty(&manifest.to_document().unwrap()).unwrap();
        let reloaded = ManifestLoader::load_str(&text).unwrap();
        prop_assert_eq!(manifest.hash_self(), reloaded.hash_self());
        prop_assert_eq!(reloaded.compute_hash().unwrap(), reloaded.hash_self().to_string());
    }

    /// Editing any rule's reason changes the hash.
    #[test]
    fn reason_change_changes_hash(rules in arb_rules(), pick in any::<prop::sample::Index>()) {
        let original = ManifestLoader::load_str(&render(&rules, &[], false)).unwrap();

        let mut edited = rules.clone();
        let i = pick.index(edited.len());
        let reason = format!("{} (edited)", edited[i]["reason"].as_str().unwrap_or_default());
        edited[i]["reason"] = json!(reason);

        let changed = ManifestLoader::load_str(&render(&edited, &[], false)).unwrap();
        prop_assert_ne!(original.hash_self(), changed.hash_self());
    }
}

#[test]
fn hash_prev_of_other_manifest_is_irrelevant() {
    let base = json!({
        "version": "1",
        "budget_defaults": Budget::default(),
        "rules": [],
    });
    let target = ManifestLoader::load_value(base.clone()).unwrap();

    let mut other_a = base.clone();
    other_a["version"] = json!("2");
    other_a["hash_prev"] = json!("aaaa");
    let mut other_b = other_a.clone();
    other_b["hash_prev"] = json!("bbbb");

    let a = ManifestLoader::load_value(other_a).unwrap();
    let b = ManifestLoader::load_value(other_b).unwrap();

    assert_ne!(a.hash_self(), b.hash_self());
    assert_eq!(
        target.hash_self(),
        ManifestLoader::load_value(base).unwrap().hash_self()
    );
}
