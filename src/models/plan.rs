use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PlannerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub uid: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notified: bool,
    pub notify_at_utc: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.uid == other.uid
            && self.date == other.date
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.title == other.title
            && self.description == other.description
            && self.notified == other.notified
            && self.notify_at_utc == other.notify_at_utc
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
    }
}

impl Plan {
    /// Returns true if `other` overlaps this plan on the half-open interval [start, end).
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && self.end_time > start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanUpdate {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// If true, conflicting plans are deleted (and their jobs cancelled)
    /// before this update is applied.
    #[serde(default)]
    pub force: bool,
}

/// Validate a NewPlan before creation.
pub fn validate_new_plan(plan: &NewPlan) -> Result<(), PlannerError> {
    if plan.title.trim().is_empty() || plan.title.chars().count() > 100 {
        return Err(PlannerError::Validation(
            "title must be 1-100 characters".to_string(),
        ));
    }
    if plan.description.chars().count() > 500 {
        return Err(PlannerError::Validation(
            "description must be at most 500 characters".to_string(),
        ));
    }
    if plan.end_time <= plan.start_time {
        return Err(PlannerError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }
    Ok(())
}

/// Validate a PlanUpdate before applying. Only checks fields present.
pub fn validate_plan_update(update: &PlanUpdate) -> Result<(), PlannerError> {
    if let Some(ref title) = update.title {
        if title.trim().is_empty() || title.chars().count() > 100 {
            return Err(PlannerError::Validation(
                "title must be 1-100 characters".to_string(),
            ));
        }
    }
    if let Some(ref description) = update.description {
        if description.chars().count() > 500 {
            return Err(PlannerError::Validation(
                "description must be at most 500 characters".to_string(),
            ));
        }
    }
    if let (Some(start), Some(end)) = (update.start_time, update.end_time) {
        if end <= start {
            return Err(PlannerError::Validation(
                "end_time must be after start_time".to_string(),
            ));
        }
    }
    Ok(())
}
