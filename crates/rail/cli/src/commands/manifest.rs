//! Manifest commands

use crate::commands::load_manifest;
use crate::output::{print_json, print_rows, print_success, print_warning, OutputFormat};
use clap::Subcommand;
use rail_manifest::{create_default_manifest, ManifestHistory, ManifestRule};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Subcommand)]
pub enum ManifestCommands {
    /// Validate a manifest document and report every problem found
    Validate {
        /// Manifest JSON file
        file: PathBuf,
    },

    /// Print the content hash of a manifest
    Hash {
        /// Manifest JSON file
        file: PathBuf,
    },

    /// List rules in evaluation order
    Rules {
        /// Manifest JSON file
        file: PathBuf,
    },

    /// Check that each manifest links to the one before it
    Chain {
        /// Manifest JSON files, oldest first
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the built-in default manifest
    Default,
}

#[derive(Tabled, Serialize)]
struct RuleRow {
    #[tabled(rename = "PRIORITY")]
    priority: i64,
    #[tabled(rename = "RULE")]
    rule_id: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "ENABLED")]
    enabled: bool,
    #[tabled(rename = "CONDITION")]
    condition: String,
}

impl From<&ManifestRule> for RuleRow {
    fn from(rule: &ManifestRule) -> Self {
        let condition = if rule.condition.is_empty() {
            "*".to_string()
        } else {
            serde_json::to_string(&rule.condition).unwrap_or_default()
        };
        Self {
            priority: rule.priority,
            rule_id: rule.rule_id.clone(),
            mode: rule.mode.to_string(),
            enabled: rule.enabled,
            condition,
        }
    }
}

#[derive(Serialize)]
struct ValidationSummary<'a> {
    valid: bool,
    version: &'a str,
    hash: &'a str,
    rules: usize,
    risk_classes: usize,
    job_overrides: usize,
}

pub async fn execute(command: ManifestCommands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        ManifestCommands::Validate { file } => {
            let manifest = load_manifest(&file)?;
            match format {
                OutputFormat::Json => print_json(&ValidationSummary {
                    valid: true,
                    version: manifest.version(),
                    hash: manifest.hash_self(),
                    rules: manifest.rules().len(),
                    risk_classes: manifest.risk_classes().len(),
                    job_overrides: manifest.job_overrides().len(),
                })?,
                OutputFormat::Table => {
                    print_success(&format!(
                        "Manifest {} is valid ({} rules, hash {})",
                        manifest.version(),
                        manifest.rules().len(),
                        manifest.hash_self()
                    ));
                    if manifest.shadow_mode() {
                        print_warning("Manifest is flagged for shadow mode only");
                    }
                }
            }
        }

        ManifestCommands::Hash { file } => {
            let manifest = load_manifest(&file)?;
            println!("{}", manifest.hash_self());
        }

        ManifestCommands::Rules { file } => {
            let manifest = load_manifest(&file)?;
            let rows: Vec<RuleRow> = manifest.evaluation_order().map(RuleRow::from).collect();
            print_rows(rows, format)?;
        }

        ManifestCommands::Chain { files } => {
            let mut history = ManifestHistory::new(false);
            for file in &files {
                history.append(Arc::new(load_manifest(file)?))?;
            }

            let verification = history.verify();
            if let Some(index) = verification.first_broken_index {
                anyhow::bail!(
                    "hash chain broken at {} (manifest {} of {})",
                    files[index].display(),
                    index + 1,
                    verification.total
                );
            }
            print_success(&format!(
                "Hash chain intact across {} manifests",
                verification.total
            ));
        }

        ManifestCommands::Default => {
            print_json(&create_default_manifest().to_document()?)?;
        }
    }

    Ok(())
}
