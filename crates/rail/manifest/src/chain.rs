//! Manifest hash chain
//!
//! Each manifest may name the `hash_self` of the manifest it supersedes in
//! `hash_prev`. The loader accepts any value; enforcement happens when a
//! manifest is appended to a [`ManifestHistory`] with enforcement enabled.

use crate::error::{ManifestError, Result};
use crate::model::Manifest;
use std::sync::Arc;
use tracing::{info, warn};

/// Check that `next` links to `prev`.
pub fn verify_chain(prev: &Manifest, next: &Manifest) -> Result<()> {
    if next.follows(prev) {
        Ok(())
    } else {
        Err(ManifestError::ChainBroken {
            version: next.version().to_string(),
            expected: prev.hash_self().to_string(),
            found: next.hash_prev().map(str::to_string),
        })
    }
}

/// Result of verifying a whole history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Whether every link holds
    pub valid: bool,

    /// Number of manifests checked
    pub total: usize,

    /// Index of the first manifest whose link is broken
    pub first_broken_index: Option<usize>,
}

/// Append-only, in-memory record of activated manifests
#[derive(Debug, Default)]
pub struct ManifestHistory {
    entries: Vec<Arc<Manifest>>,
    enforce_chain: bool,
}

impl ManifestHistory {
    pub fn new(enforce_chain: bool) -> Self {
        Self {
            entries: Vec::new(),
            enforce_chain,
        }
    }

    /// Append a manifest, which becomes the head of the history.
    ///
    /// With enforcement enabled a manifest that does not link to the
    /// current head is rejected and the history is left unchanged.
    pub fn append(&mut self, manifest: Arc<Manifest>) -> Result<()> {
        if let Some(head) = self.entries.last() {
            if let Err(e) = verify_chain(head, &manifest) {
                if self.enforce_chain {
                    warn!(
                        version = %manifest.version(),
                        head = %head.hash_self(),
                        "Rejecting manifest with broken hash chain"
                    );
                    return Err(e);
                }
                warn!(
                    version = %manifest.version(),
                    hash_prev = ?manifest.hash_prev(),
                    head = %head.hash_self(),
                    "Manifest does not link to the previous one"
                );
            }
        }

        info!(
            version = %manifest.version(),
            hash = %manifest.hash_self(),
            "Manifest appended to history"
        );
        self.entries.push(manifest);
        Ok(())
    }

    /// Current head
    pub fn head(&self) -> Option<&Arc<Manifest>> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[Arc<Manifest>] {
        &self.entries
    }

    pub fn find_version(&self, version: &str) -> Option<&Arc<Manifest>> {
        self.entries.iter().rev().find(|m| m.version() == version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enforces_chain(&self) -> bool {
        self.enforce_chain
    }

    /// Walk the whole history and report the first broken link.
    pub fn verify(&self) -> ChainVerification {
        let first_broken_index = self
            .entries
            .windows(2)
            .position(|pair| !pair[1].follows(&pair[0]))
            .map(|i| i + 1);

        ChainVerification {
            valid: first_broken_index.is_none(),
            total: self.entries.len(),
            first_broken_index,
        }
    }
}
