//! CLI command implementations

pub mod evaluate;
pub mod manifest;
pub mod shadow;

use anyhow::Context;
use rail_manifest::{Manifest, ManifestError, ManifestLoader};
use rail_types::JobContext;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Load a manifest file, listing every validation error on failure
pub(crate) fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    match ManifestLoader::load_file(path) {
        Ok(manifest) => {
            debug!(
                path = %path.display(),
                version = manifest.version(),
                rules = manifest.rules().len(),
                "Manifest loaded"
            );
            Ok(manifest)
        }
        Err(ManifestError::InvalidSchema(err)) => {
            for message in &err.validation_errors {
                crate::output::print_error(message);
            }
            Err(err).with_context(|| format!("{} is not a valid manifest", path.display()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read job contexts from a file.
///
/// Accepts a single context object, an array of contexts, or one context
/// per line.
pub(crate) fn read_contexts(path: &Path) -> anyhow::Result<Vec<JobContext>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let contexts = parse_contexts(&raw)
        .with_context(|| format!("invalid job contexts in {}", path.display()))?;
    debug!(path = %path.display(), count = contexts.len(), "Job contexts read");
    Ok(contexts)
}

fn parse_contexts(raw: &str) -> anyhow::Result<Vec<JobContext>> {
    let mut contexts = Vec::new();

    for (index, value) in serde_json::Deserializer::from_str(raw)
        .into_iter::<Value>()
        .enumerate()
    {
        let value = value.with_context(|| format!("document {} is not valid JSON", index + 1))?;
        match value {
            Value::Array(items) => {
                for item in items {
                    contexts.push(parse_context(item, contexts.len())?);
                }
            }
            other => contexts.push(parse_context(other, contexts.len())?),
        }
    }

    Ok(contexts)
}

fn parse_context(value: Value, index: usize) -> anyhow::Result<JobContext> {
    serde_json::from_value(value).with_context(|| format!("context {} is malformed", index + 1))
}
