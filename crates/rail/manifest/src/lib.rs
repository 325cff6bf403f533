//! # RAIL Manifest
//!
//! Governance manifests: versioned, hashed policy documents made of
//! prioritized rules, default budgets, risk classes and job-type overrides.
//!
//! ## Overview
//!
//! - [`ManifestLoader`]: parses and validates a JSON document, reporting
//!   every problem as a [`ManifestInvalidSchemaError`]
//! - [`Manifest`]: the immutable, validated policy with its content hash
//! - [`create_default_manifest`]: a catch-all DIRECT policy for when nothing
//!   has been deployed yet
//! - [`ManifestHistory`]: append-only record linking manifests by hash
//!
//! ## Content hash
//!
//! `hash_self` is the SHA-256 of the canonical JSON (sorted keys, compact)
//! of every field except `manifest_id`, `created_at` and `hash_self`
//! itself. It is reproducible from content alone.
//!
//! ```rust
//! use rail_manifest::ManifestLoader;
//!
//! let manifest = ManifestLoader::load_str(r#"{
//!     "version": "1.0.0",
//!     "budget_defaults": {
//!         "timeout_ms": 30000, "max_retries": 3, "max_parallel_attempts": 1,
//!         "max_global_parallel": 10, "max_llm_tokens": 8192, "grace_period_ms": 5000
//!     },
//!     "rules": [
//!         {"rule_id": "llm", "priority": 100, "condition": {"job_type": "llm_call"}, "mode": "RAIL"},
//!         {"rule_id": "rest", "priority": 1000, "condition": {}, "mode": "DIRECT"}
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(manifest.hash_self().len(), 64);
//! ```

#![deny(unsafe_code)]

pub mod chain;
pub mod error;
pub mod hash;
pub mod loader;
pub mod model;

pub use chain::{verify_chain, ChainVerification, ManifestHistory};
pub use error::{ManifestError, ManifestInvalidSchemaError, Result};
pub use loader::{
    create_default_manifest, load_manifest, ManifestLoader, DEFAULT_MANIFEST_VERSION,
    DEFAULT_RULE_ID,
};
pub use model::{JobOverride, Manifest, ManifestRule, RiskClass, RuleCondition};
