//! Job context
//!
//! The context carries everything rule matching needs to know about a unit
//! of work. It is produced upstream by the mission queue.

use crate::ids::{JobId, MissionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of a unit of work submitted for a governance decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    /// Mission this job belongs to
    pub mission_id: MissionId,

    /// Job identity
    pub job_id: JobId,

    /// Job type (e.g. "llm_call", "cleanup")
    pub job_type: String,

    /// Deployment environment (production, staging, development)
    pub environment: String,

    /// Whether the job processes personal data
    #[serde(default)]
    pub uses_personal_data: bool,

    /// Risk class the job is tagged with, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_class: Option<String>,

    /// Whether a human approval accompanies the job
    #[serde(default)]
    pub approval_granted: bool,

    /// Free-form attributes used only for rule matching
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl JobContext {
    /// Create a context for a job type with generated identifiers
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            mission_id: MissionId::generate(),
            job_id: JobId::generate(),
            job_type: job_type.into(),
            environment: "development".into(),
            uses_personal_data: false,
            risk_class: None,
            approval_granted: false,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the mission identifier
    pub fn with_mission_id(mut self, mission_id: impl Into<MissionId>) -> Self {
        self.mission_id = mission_id.into();
        self
    }

    /// Set the job identifier
    pub fn with_job_id(mut self, job_id: impl Into<JobId>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Mark the job as processing personal data
    pub fn with_personal_data(mut self, uses_personal_data: bool) -> Self {
        self.uses_personal_data = uses_personal_data;
        self
    }

    /// Tag the job with a risk class
    pub fn with_risk_class(mut self, risk_class: impl Into<String>) -> Self {
        self.risk_class = Some(risk_class.into());
        self
    }

    /// Record that a human approved the job
    pub fn with_approval(mut self) -> Self {
        self.approval_granted = true;
        self
    }

    /// Add a matching attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a matching attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
