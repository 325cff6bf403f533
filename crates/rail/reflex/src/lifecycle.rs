//! Per-job lifecycle state machine.
//!
//! A lifecycle starts RUNNING when a RAIL job begins executing and ends in
//! COMPLETED or CANCELLED. Every accepted change is appended to the history;
//! a refused change leaves the lifecycle untouched.

use crate::error::LifecycleError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rail_types::{JobId, JobState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Check whether `from -> to` is allowed.
pub fn is_valid_transition(from: JobState, to: JobState) -> bool {
    use JobState::*;

    match (from, to) {
        (Running, Suspended | Throttled | Blocked | Cancelled | Completed) => true,

        // Re-suspending extends the cooldown
        (Suspended, Running | Suspended | Blocked | Cancelled) => true,

        // Re-throttling restarts the window
        (Throttled, Running | Throttled | Suspended | Blocked | Cancelled | Completed) => true,

        (Blocked, Running | Cancelled) => true,

        // Terminal states cannot transition
        (Completed, _) | (Cancelled, _) => false,

        _ => false,
    }
}

/// One accepted state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: JobState,
    pub to: JobState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Rate reduction in force while a job is throttled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleWindow {
    pub rate_factor: f64,
    pub until: DateTime<Utc>,
}

/// Lifecycle of a single governed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLifecycle {
    job_id: JobId,
    state: JobState,
    started_at: DateTime<Utc>,
    cooldown_until: Option<DateTime<Utc>>,
    throttle: Option<ThrottleWindow>,
    history: Vec<StateChange>,
}

impl JobLifecycle {
    pub fn new(job_id: JobId) -> Self {
        Self::started_at(job_id, Utc::now())
    }

    pub fn started_at(job_id: JobId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            state: JobState::Running,
            started_at: now,
            cooldown_until: None,
            throttle: None,
            history: Vec::new(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// End of the current suspension, if suspended
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    pub fn throttle_window(&self) -> Option<ThrottleWindow> {
        self.throttle
    }

    /// Fraction of the normal rate the job may run at.
    pub fn rate_factor_at(&self, now: DateTime<Utc>) -> f64 {
        match (self.state, self.throttle) {
            (JobState::Throttled, Some(window)) if now < window.until => window.rate_factor,
            _ => 1.0,
        }
    }

    /// Move to `to`, recording the change.
    pub fn transition(
        &mut self,
        to: JobState,
        reason: impl Into<String>,
    ) -> Result<StateChange, LifecycleError> {
        self.transition_at(to, reason, Utc::now())
    }

    pub fn transition_at(
        &mut self,
        to: JobState,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<StateChange, LifecycleError> {
        if !is_valid_transition(self.state, to) {
            return Err(LifecycleError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.state,
                to,
            });
        }

        let change = StateChange {
            from: self.state,
            to,
            reason: reason.into(),
            at: now,
        };
        self.state = to;

        if to != JobState::Suspended {
            self.cooldown_until = None;
        }
        if to != JobState::Throttled {
            self.throttle = None;
        }

        self.history.push(change.clone());
        Ok(change)
    }

    /// Suspend until `now + cooldown`.
    pub fn suspend_at(
        &mut self,
        reason: impl Into<String>,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<StateChange, LifecycleError> {
        let change = self.transition_at(JobState::Suspended, reason, now)?;
        self.cooldown_until = Some(deadline(now, cooldown));
        Ok(change)
    }

    /// Throttle to `rate_factor` of the normal rate until `now + cooldown`.
    pub fn throttle_at(
        &mut self,
        reason: impl Into<String>,
        cooldown: Duration,
        rate_factor: f64,
        now: DateTime<Utc>,
    ) -> Result<StateChange, LifecycleError> {
        let change = self.transition_at(JobState::Throttled, reason, now)?;
        self.throttle = Some(ThrottleWindow {
            rate_factor: rate_factor.clamp(0.0, 1.0),
            until: deadline(now, cooldown),
        });
        Ok(change)
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<StateChange, LifecycleError> {
        self.transition(JobState::Cancelled, reason)
    }

    pub fn block(&mut self, reason: impl Into<String>) -> Result<StateChange, LifecycleError> {
        self.transition(JobState::Blocked, reason)
    }

    pub fn resume(&mut self, reason: impl Into<String>) -> Result<StateChange, LifecycleError> {
        self.transition(JobState::Running, reason)
    }

    pub fn complete(&mut self) -> Result<StateChange, LifecycleError> {
        self.transition(JobState::Completed, "completed")
    }

    /// Return to RUNNING once a suspension or throttle window has expired.
    ///
    /// Returns `None` when nothing was due.
    pub fn resume_if_due(&mut self, now: DateTime<Utc>) -> Option<StateChange> {
        let due = match self.state {
            JobState::Suspended => self.cooldown_until.is_some_and(|until| now >= until),
            JobState::Throttled => self.throttle.is_some_and(|window| now >= window.until),
            _ => false,
        };
        if !due {
            return None;
        }
        self.transition_at(JobState::Running, "cooldown expired", now).ok()
    }
}

fn deadline(now: DateTime<Utc>, cooldown: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(cooldown)
        .ok()
        .and_then(|cooldown| now.checked_add_signed(cooldown))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> JobLifecycle {
        JobLifecycle::new(JobId::new("job-1"))
    }

    #[test]
    fn test_transition_table() {
        use JobState::*;
        let all = [Running, Suspended, Throttled, Blocked, Completed, Cancelled];

        for to in all {
            assert!(!is_valid_transition(Completed, to));
            assert!(!is_valid_transition(Cancelled, to));
        }
        assert!(is_valid_transition(Running, Suspended));
        assert!(is_valid_transition(Suspended, Suspended));
        assert!(is_valid_transition(Throttled, Suspended));
        assert!(is_valid_transition(Blocked, Running));
        assert!(!is_valid_transition(Running, Running));
        assert!(!is_valid_transition(Suspended, Throttled));
        assert!(!is_valid_transition(Suspended, Completed));
        assert!(!is_valid_transition(Blocked, Completed));
    }

    #[test]
    fn test_suspend_records_cooldown() {
        let mut lc = lifecycle();
        let now = Utc::now();
        lc.suspend_at("retries exhausted", Duration::from_secs(300), now)
            .unwrap();

        assert_eq!(lc.state(), JobState::Suspended);
        assert_eq!(lc.cooldown_until(), Some(now + ChronoDuration::seconds(300)));
        assert_eq!(lc.history().len(), 1);
        assert_eq!(lc.history()[0].reason, "retries exhausted");
    }

    #[test]
    fn test_resume_if_due() {
        let mut lc = lifecycle();
        let now = Utc::now();
        lc.suspend_at("x", Duration::from_secs(60), now).unwrap();

        assert!(lc.resume_if_due(now + ChronoDuration::seconds(59)).is_none());
        let change = lc.resume_if_due(now + ChronoDuration::seconds(60)).unwrap();
        assert_eq!(change.from, JobState::Suspended);
        assert_eq!(lc.state(), JobState::Running);
        assert_eq!(lc.cooldown_until(), None);
    }

    #[test]
    fn test_throttle_window() {
        let mut lc = lifecycle();
        let now = Utc::now();
        lc.throttle_at("circuit open", Duration::from_secs(120), 0.5, now)
            .unwrap();

        assert_eq!(lc.rate_factor_at(now), 0.5);
        assert_eq!(lc.rate_factor_at(now + ChronoDuration::seconds(120)), 1.0);

        assert!(lc.resume_if_due(now + ChronoDuration::seconds(121)).is_some());
        assert!(lc.throttle_window().is_none());
    }

    #[test]
    fn test_terminal_refuses_changes() {
        let mut lc = lifecycle();
        lc.cancel("fatal").unwrap();
        assert!(lc.is_terminal());

        let err = lc.resume("retry").unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                job_id: JobId::new("job-1"),
                from: JobState::Cancelled,
                to: JobState::Running,
            }
        );
        assert_eq!(lc.history().len(), 1);
    }

    #[test]
    fn test_block_then_resume_then_complete() {
        let mut lc = lifecycle();
        lc.block("approval required").unwrap();
        lc.resume("approved").unwrap();
        lc.complete().unwrap();

        let states: Vec<_> = lc.history().iter().map(|c| c.to).collect();
        assert_eq!(
            states,
            vec![JobState::Blocked, JobState::Running, JobState::Completed]
        );
    }
}
