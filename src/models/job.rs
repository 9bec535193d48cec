use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable, one-shot scheduler job keyed by plan identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub plan_id: Uuid,
    pub run_at_utc: DateTime<Utc>,
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_seconds: u64,
    /// Set while a dispatcher worker has exclusively claimed this job.
    #[serde(default)]
    pub acquired: bool,
}

fn default_misfire_grace() -> u64 {
    60
}

pub fn job_id_for_plan(plan_id: Uuid) -> String {
    format!("plan_{plan_id}")
}

impl Job {
    pub fn new(plan_id: Uuid, run_at_utc: DateTime<Utc>, misfire_grace_seconds: u64) -> Self {
        Self {
            job_id: job_id_for_plan(plan_id),
            plan_id,
            run_at_utc,
            misfire_grace_seconds,
            acquired: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_format() {
        let id = Uuid::now_v7();
        assert_eq!(job_id_for_plan(id), format!("plan_{id}"));
    }

    #[test]
    fn test_job_new_not_acquired() {
        let job = Job::new(Uuid::now_v7(), Utc::now(), 60);
        assert!(!job.acquired);
        assert_eq!(job.misfire_grace_seconds, 60);
    }
}
