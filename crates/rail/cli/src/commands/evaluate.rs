//! Evaluate a job context against a manifest

use crate::commands::{load_manifest, read_contexts};
use crate::output::{print_json, print_rows, OutputFormat};
use rail_decision::DecisionEvaluator;
use rail_types::Decision;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct DecisionRow {
    #[tabled(rename = "JOB")]
    job_id: String,
    #[tabled(rename = "TYPE")]
    job_type: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "RULE")]
    rule: String,
    #[tabled(rename = "TIMEOUT_MS")]
    timeout_ms: u64,
    #[tabled(rename = "RETRIES")]
    max_retries: u32,
    #[tabled(rename = "APPROVAL")]
    require_approval: bool,
}

pub async fn execute(manifest: &Path, contexts: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let evaluator = DecisionEvaluator::new(Arc::new(load_manifest(manifest)?));
    let contexts = read_contexts(contexts)?;

    let decisions: Vec<Decision> = contexts
        .iter()
        .map(|ctx| evaluator.evaluate(ctx, false))
        .collect();

    match format {
        OutputFormat::Json => {
            if let [decision] = decisions.as_slice() {
                print_json(decision)?;
            } else {
                print_json(&decisions)?;
            }
        }
        OutputFormat::Table => {
            let rows = contexts
                .iter()
                .zip(&decisions)
                .map(|(ctx, decision)| DecisionRow {
                    job_id: ctx.job_id.as_str().to_string(),
                    job_type: ctx.job_type.clone(),
                    mode: decision.mode.to_string(),
                    rule: decision
                        .selected_rule
                        .clone()
                        .unwrap_or_else(|| "(fallback)".to_string()),
                    timeout_ms: decision.budget.timeout_ms,
                    max_retries: decision.budget.max_retries,
                    require_approval: decision.require_approval,
                })
                .collect();
            print_rows(rows, format)?;
        }
    }

    Ok(())
}
