//! Property tests: rule precedence and catch-all safety.

use proptest::prelude::*;
use rail_decision::{evaluate, DecisionEvaluator};
use rail_manifest::{Manifest, ManifestLoader};
use rail_types::{Budget, ExecutionMode, JobContext};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

const JOB_TYPES: &[&str] = &["llm_call", "cleanup", "export", "ingest"];
const ENVIRONMENTS: &[&str] = &["production", "staging", "development"];

#[derive(Debug, Clone)]
struct RuleShape {
    priority: i64,
    job_type: Option<&'static str>,
    environment: Option<&'static str>,
    rail: bool,
    enabled: bool,
}

fn arb_rule_shape() -> impl Strategy<Value = RuleShape> {
    (
        -50i64..50,
        prop::option::of(prop::sample::select(JOB_TYPES)),
        prop::option::of(prop::sample::select(ENVIRONMENTS)),
        any::<bool>(),
        prop::bool::weighted(0.8),
    )
        .prop_map(|(priority, job_type, environment, rail, enabled)| RuleShape {
            priority,
            job_type,
            environment,
            rail,
            enabled,
        })
}

fn arb_context() -> impl Strategy<Value = JobContext> {
    (
        prop::sample::select(JOB_TYPES),
        prop::sample::select(ENVIRONMENTS),
    )
        .prop_map(|(job_type, environment)| {
            JobContext::new(job_type)
                .with_job_id("job")
                .with_mission_id("mission")
                .with_environment(environment)
        })
}

fn build(shapes: &[RuleShape]) -> Manifest {
    let rules: Vec<Value> = shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| {
            json!({
                "rule_id": format!("r{}", i),
                "priority": shape.priority,
                "condition": {"job_type": shape.job_type, "environment": shape.environment},
                "mode": if shape.rail { "RAIL" } else { "DIRECT" },
                "enabled": shape.enabled,
            })
        })
        .collect();

    ManifestLoader::load_value(json!({
        "version": "prop",
        "budget_defaults": Budget::default(),
        "rules": rules,
    }))
    .unwrap()
}

fn expected_match(shape: &RuleShape, ctx: &JobContext) -> bool {
    shape.enabled
        && shape.job_type.map_or(true, |t| t == ctx.job_type)
        && shape.environment.map_or(true, |e| e == ctx.environment)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// The selected rule is the matching enabled rule with the smallest
    /// priority, earliest declaration breaking ties.
    #[test]
    fn smallest_priority_match_wins(
        shapes in prop::collection::vec(arb_rule_shape(), 0..12),
        ctx in arb_context(),
    ) {
        let manifest = build(&shapes);
        let decision = evaluate(&manifest, &ctx, false);

        let expected = shapes
            .iter()
            .enumerate()
            .filter(|(_, shape)| expected_match(shape, &ctx))
            .min_by_key(|(i, shape)| (shape.priority, *i));

        match expected {
            Some((i, shape)) => {
                let expected_id = format!("r{}", i);
                prop_assert_eq!(decision.selected_rule.as_deref(), Some(expected_id.as_str()));
                prop_assert_eq!(decision.mode.is_governed(), shape.rail);
            }
            None => {
                prop_assert!(decision.is_fallback());
                prop_assert_eq!(decision.mode, ExecutionMode::Direct);
            }
        }

        let matched = shapes.iter().filter(|shape| expected_match(shape, &ctx)).count();
        prop_assert_eq!(decision.triggered_rules.len(), matched);
    }

    /// Reversing declaration order only matters for equal priorities.
    #[test]
    fn order_irrelevant_for_distinct_priorities(
        shapes in prop::collection::vec(arb_rule_shape(), 1..10),
        ctx in arb_context(),
    ) {
        let mut distinct = shapes.clone();
        for (i, shape) in distinct.iter_mut().enumerate() {
            shape.priority = shape.priority * 100 + i as i64;
        }
        let forward = build(&distinct);

        let mut reversed_specs: Vec<(usize, RuleShape)> =
            distinct.iter().cloned().enumerate().collect();
        reversed_specs.reverse();
        let reversed_rules: Vec<Value> = reversed_specs
            .iter()
            .map(|(i, shape)| json!({
                "rule_id": format!("r{}", i),
                "priority": shape.priority,
                "condition": {"job_type": shape.job_type, "environment": shape.environment},
                "mode": if shape.rail { "RAIL" } else { "DIRECT" },
                "enabled": shape.enabled,
            }))
            .collect();
        let backward = ManifestLoader::load_value(json!({
            "version": "prop",
            "budget_defaults": Budget::default(),
            "rules": reversed_rules,
        }))
        .unwrap();

        let a = evaluate(&forward, &ctx, false);
        let b = evaluate(&backward, &ctx, false);
        prop_assert_eq!(a.selected_rule, b.selected_rule);
        prop_assert_eq!(a.mode, b.mode);
        prop_assert_eq!(a.triggered_rules, b.triggered_rules);
    }

    /// A catch-all rule at the maximum priority catches whatever nothing
    /// else does.
    #[test]
    fn catch_all_catches_everything_else(
        shapes in prop::collection::vec(arb_rule_shape(), 0..8),
        ctx in arb_context(),
    ) {
        let mut rules: Vec<Value> = shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| json!({
                "rule_id": format!("r{}", i),
                "priority": shape.priority,
                "condition": {"job_type": shape.job_type, "environment": shape.environment},
                "mode": "RAIL",
                "enabled": shape.enabled,
            }))
            .collect();
        rules.push(json!({
            "rule_id": "catch-all",
            "priority": i64::MAX,
            "condition": {},
            "mode": "DIRECT",
        }));

        let manifest = ManifestLoader::load_value(json!({
            "version": "prop",
            "budget_defaults": Budget::default(),
            "rules": rules,
        }))
        .unwrap();

        let decision = evaluate(&manifest, &ctx, false);
        prop_assert!(!decision.is_fallback());
        prop_assert_eq!(decision.triggered_rules.last().map(String::as_str), Some("catch-all"));
        if !shapes.iter().any(|shape| expected_match(shape, &ctx)) {
            prop_assert_eq!(decision.selected_rule.as_deref(), Some("catch-all"));
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn llm_calls_governed_everything_else_direct() {
    let manifest = ManifestLoader::load_value(json!({
        "version": "1.0.0",
        "budget_defaults": Budget::default(),
        "rules": [
            {"rule_id": "llm", "priority": 100, "condition": {"job_type": "llm_call"}, "mode": "RAIL"},
            {"rule_id": "default", "priority": 1000, "condition": {}, "mode": "DIRECT"}
        ]
    }))
    .unwrap();
    let evaluator = DecisionEvaluator::from(manifest);

    let llm = evaluator.evaluate(&JobContext::new("llm_call"), false);
    assert_eq!(llm.mode, ExecutionMode::Rail);

    let cleanup = evaluator.evaluate(&JobContext::new("cleanup"), false);
    assert_eq!(cleanup.mode, ExecutionMode::Direct);
}

#[test]
fn budget_resolution_order() {
    let manifest = ManifestLoader::load_value(json!({
        "version": "1.0.0",
        "budget_defaults": Budget { timeout_ms: 30_000, ..Budget::default() },
        "risk_classes": {"elevated": {"budget_multiplier": 2.0}},
        "job_overrides": {"x": {"timeout_ms": 5000}},
        "rules": [{"rule_id": "all", "priority": 0, "mode": "RAIL"}]
    }))
    .unwrap();

    let x = JobContext::new("x").with_risk_class("elevated");
    assert_eq!(evaluate(&manifest, &x, false).budget.timeout_ms, 5_000);

    let y = JobContext::new("y").with_risk_class("elevated");
    assert_eq!(evaluate(&manifest, &y, false).budget.timeout_ms, 60_000);
}
