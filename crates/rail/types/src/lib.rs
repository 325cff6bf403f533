//! # RAIL Types
//!
//! Shared vocabulary for the execution governance core.
//!
//! ## Overview
//!
//! Every job submitted by the orchestrator is described by a [`JobContext`].
//! The decision engine turns it into a [`Decision`] that either lets the job
//! run unsupervised ([`ExecutionMode::Direct`]) or under budget-bounded
//! governance ([`ExecutionMode::Rail`]). The enforcement layer classifies
//! failures through [`ClassifiedError`] and reports what it does to three
//! collaborators:
//!
//! - [`AuditSink`]: receives decision records, shadow comparisons and lifecycle transitions
//! - [`ImmuneSystem`]: notified of high-severity anomalies
//! - [`MetricsSink`]: optional counters, never allowed to affect control flow

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod budget;
pub mod context;
pub mod decision;
pub mod error;
pub mod events;
pub mod ids;
pub mod sink;
pub mod state;

pub use budget::{Budget, BudgetPatch};
pub use context::JobContext;
pub use decision::{Decision, ExecutionMode, ImpactAssessment, ShadowDecisionComparison};
pub use error::{
    ClassifiedError, ErrorCode, ErrorMetadata, FailureKind, Severity, TaskError,
};
pub use events::{AuditEvent, AuditRecord};
pub use ids::{JobId, MissionId};
pub use sink::{
    AuditSink, ImmunePayload, ImmuneSystem, MemoryAuditSink, MetricsSink, NoopImmuneSystem,
    NoopMetrics, RecordingImmuneSystem, SinkError,
};
pub use state::{CircuitState, JobState, ReflexActionKind};
