//! # RAIL Runtime
//!
//! Wires the governance core into a job executor.
//!
//! ## Key Components
//!
//! - [`GovernanceRuntime`]: decide, shadow and enforce for each job
//! - [`GovernanceConfig`]: layered configuration (defaults, file, `RAIL_*` env)
//! - [`PrometheusMetrics`]: `MetricsSink` backed by a Prometheus registry
//! - [`TracingAuditSink`] / [`CompositeAuditSink`]: audit trail outputs
//! - [`init_tracing`]: global subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use rail_runtime::{GovernanceConfig, GovernanceRuntime};
//! use rail_types::{JobContext, TaskError};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = GovernanceRuntime::builder(GovernanceConfig::load(None)?).build()?;
//! let ctx = JobContext::new("llm_call").with_environment("production");
//!
//! let outcome = runtime
//!     .execute(&ctx, Some("llm-provider"), &CancellationToken::new(), || async {
//!         Ok::<_, TaskError>("done")
//!     })
//!     .await?;
//! println!("{} ran in {} mode", outcome.value, outcome.decision.mode);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod runtime;
pub mod telemetry;

pub use audit::{CompositeAuditSink, TracingAuditSink};
pub use config::{GovernanceConfig, LoggingConfig, ManifestConfig};
pub use error::{AttemptError, ExecutionError, Result, RuntimeError};
pub use metrics::PrometheusMetrics;
pub use runtime::{GovernanceRuntime, GovernanceRuntimeBuilder, JobOutcome};
pub use telemetry::init_tracing;
