//! # RAIL Reflex
//!
//! Automated corrective actions for governed jobs.
//!
//! Each RAIL job gets a [`JobLifecycle`] when it starts executing. Repeated
//! failures drive a [`ReflexAction`] (suspend, throttle, alert, cancel) that
//! transitions the lifecycle, reports to the audit trail and, for alerts,
//! notifies the immune system.
//!
//! ```text
//!            ┌──────────► SUSPENDED ──┐
//!            │                        │
//! RUNNING ───┼──────────► THROTTLED ──┼──► RUNNING / CANCELLED
//!            │                        │
//!            ├──────────► BLOCKED ────┘
//!            │
//!            └──► COMPLETED | CANCELLED
//! ```

#![deny(unsafe_code)]

pub mod action;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;

pub use action::ReflexAction;
pub use config::ReflexConfig;
pub use error::{LifecycleError, ReflexActionFailedError, Result};
pub use lifecycle::{is_valid_transition, JobLifecycle, StateChange, ThrottleWindow};
pub use registry::LifecycleRegistry;
