//! # RAIL Shadow
//!
//! Safety rollout for governance manifests. A candidate manifest is
//! evaluated against live traffic in parallel with the active one, without
//! affecting execution, until its [`ShadowReport`] passes the
//! [`ActivationGate`].
//!
//! ## Key Components
//!
//! - [`ShadowingEngine`]: dual evaluation and divergence statistics
//! - [`ActivationGate`]: the four promotion conditions
//! - [`ShadowReport`]: rates, rule trigger counts and a bounded sample
//! - [`ShadowSnapshot`]: the raw counters, cheap enough to poll

#![deny(unsafe_code)]

pub mod engine;
pub mod gate;
pub mod report;

pub use engine::{ShadowConfig, ShadowingEngine};
pub use gate::{ActivationGate, GateInput, GateVerdict, GATE_PASSED};
pub use report::{ShadowReport, ShadowSnapshot};
