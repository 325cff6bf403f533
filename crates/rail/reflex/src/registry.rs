//! Lifecycles of in-flight RAIL jobs, keyed by job id.

use crate::error::LifecycleError;
use crate::lifecycle::{JobLifecycle, StateChange};
use dashmap::DashMap;
use parking_lot::Mutex;
use rail_types::{JobId, JobState};
use std::sync::Arc;
use tracing::debug;

/// Registry of per-job lifecycles.
///
/// Each lifecycle has its own lock; jobs never contend with each other.
/// Terminal lifecycles are removed as soon as they reach COMPLETED or
/// CANCELLED.
#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    lifecycles: DashMap<JobId, Arc<Mutex<JobLifecycle>>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a RUNNING lifecycle for `job_id`, or return the existing one.
    pub fn start(&self, job_id: &JobId) -> Arc<Mutex<JobLifecycle>> {
        self.lifecycles
            .entry(job_id.clone())
            .or_insert_with(|| {
                debug!(job_id = %job_id, "Starting job lifecycle");
                Arc::new(Mutex::new(JobLifecycle::new(job_id.clone())))
            })
            .clone()
    }

    pub fn get(&self, job_id: &JobId) -> Option<Arc<Mutex<JobLifecycle>>> {
        self.lifecycles.get(job_id).map(|lc| lc.clone())
    }

    pub fn state(&self, job_id: &JobId) -> Option<JobState> {
        self.get(job_id).map(|lc| lc.lock().state())
    }

    /// Apply `f` to a job's lifecycle under its lock.
    ///
    /// The lifecycle is dropped from the registry if `f` leaves it terminal.
    pub fn update<F>(&self, job_id: &JobId, f: F) -> Result<StateChange, LifecycleError>
    where
        F: FnOnce(&mut JobLifecycle) -> Result<StateChange, LifecycleError>,
    {
        let lifecycle = self
            .get(job_id)
            .ok_or_else(|| LifecycleError::UnknownJob(job_id.clone()))?;

        let (change, terminal) = {
            let mut guard = lifecycle.lock();
            let change = f(&mut guard)?;
            (change, guard.is_terminal())
        };

        if terminal {
            self.remove(job_id);
        }
        Ok(change)
    }

    pub fn remove(&self, job_id: &JobId) -> Option<Arc<Mutex<JobLifecycle>>> {
        let removed = self.lifecycles.remove(job_id).map(|(_, lc)| lc);
        if removed.is_some() {
            debug!(job_id = %job_id, "Removed job lifecycle");
        }
        removed
    }

    /// Job ids and states of every tracked lifecycle
    pub fn snapshot(&self) -> Vec<(JobId, JobState)> {
        self.lifecycles
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lifecycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lifecycles.is_empty()
    }
}
