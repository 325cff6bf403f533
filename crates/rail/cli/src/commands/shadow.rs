//! Replay recorded job contexts through a candidate manifest

use crate::commands::{load_manifest, read_contexts};
use crate::output::{print_json, print_success, print_warning, OutputFormat};
use colored::*;
use rail_shadow::{ShadowConfig, ShadowingEngine};
use std::path::Path;
use std::sync::Arc;

pub struct ShadowArgs<'a> {
    pub active: &'a Path,
    pub candidate: &'a Path,
    pub contexts: &'a Path,
    pub ignore_duration: bool,
    pub samples: bool,
}

pub async fn execute(
    args: ShadowArgs<'_>,
    mut config: ShadowConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let active = Arc::new(load_manifest(args.active)?);
    let candidate = Arc::new(load_manifest(args.candidate)?);
    let contexts = read_contexts(args.contexts)?;

    // A replay takes seconds, so the wall-clock requirement can never be met
    if args.ignore_duration {
        config.gate.shadow_duration_hours = 0.0;
    }

    let engine = ShadowingEngine::new(active, candidate, config);
    for ctx in &contexts {
        engine.evaluate_shadow(ctx);
    }

    let mut report = engine.generate_report();
    if !args.samples {
        report.samples.clear();
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!(
                "{} {} ({}) -> {} ({})",
                "Shadow replay:".bold(),
                report.active_version,
                report.active_hash,
                report.shadow_version,
                report.shadow_hash
            );
            println!("  Evaluations:        {}", report.evaluation_count);
            println!(
                "  Mode divergence:    {} ({:.2}%)",
                report.mode_divergence_count,
                report.mode_divergence_rate * 100.0
            );
            println!(
                "  Budget divergence:  {} ({:.2}%)",
                report.budget_divergence_count,
                report.budget_divergence_rate * 100.0
            );
            println!(
                "  Would have blocked: {} ({:.2}%)",
                report.would_have_blocked,
                report.explosion_rate * 100.0
            );

            if !report.rule_trigger_counts.is_empty() {
                println!("  {}", "Candidate rule triggers:".bold());
                for (rule, count) in &report.rule_trigger_counts {
                    println!("    {:<32} {}", rule, count);
                }
            }

            for sample in &report.samples {
                println!(
                    "  {} {} {} -> {}: {}",
                    "sample".dimmed(),
                    sample.job_id,
                    sample.active_mode,
                    sample.shadow_mode,
                    sample.impact_assessment
                );
            }

            println!();
            if report.safe_to_activate {
                print_success(&format!("Safe to activate: {}", report.activation_gate_reason));
            } else {
                print_warning(&format!(
                    "Not safe to activate: {}",
                    report.activation_gate_reason
                ));
            }
        }
    }

    Ok(())
}
