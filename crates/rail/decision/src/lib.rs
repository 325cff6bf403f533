//! # RAIL Decision
//!
//! Turns a [`Manifest`](rail_manifest::Manifest) and a
//! [`JobContext`](rail_types::JobContext) into a
//! [`Decision`](rail_types::Decision).
//!
//! Evaluation is pure and stateless, so the same evaluator can be shared
//! across every concurrent job path and called twice per context by the
//! shadow engine without interference.

#![deny(unsafe_code)]

pub mod budget;
pub mod evaluator;

pub use budget::{effective_risk_class, resolve_budget};
pub use evaluator::{evaluate, DecisionEvaluator, FALLBACK_REASON};
