//! Job status types reported by the scheduler.

use crate::reminders::TemplateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheduling state of a template after a create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// A job is live for the template.
    #[serde(rename_all = "camelCase")]
    Scheduled {
        /// Registration id, fresh on every (re)schedule.
        job_id: Uuid,
        cron: String,
        next_fire: Option<DateTime<Utc>>,
    },
    /// Template is disabled; no job.
    Disabled,
    /// Template has no cron expression; no job.
    Unscheduled,
    /// Cron expression did not parse. The template is kept; no job.
    InvalidCron { error: String },
}

impl ScheduleStatus {
    /// Whether a job is live.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled { .. })
    }

    /// Job registration id when scheduled.
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Self::Scheduled { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Validation warning for the caller, if any.
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::InvalidCron { error } => Some(error),
            _ => None,
        }
    }
}

/// One entry of the live job table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub template_id: TemplateId,
    pub template_key: String,
    pub job_id: Uuid,
    pub cron: String,
    pub next_fire: Option<DateTime<Utc>>,
    /// `false` once the job task has exited (e.g. no future occurrence).
    pub running: bool,
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn status_serializes_with_tag() {
        let status = ScheduleStatus::InvalidCron {
            error: "bad".to_owned(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "invalid_cron");
        assert_eq!(json["error"], "bad");
        assert_eq!(status.warning(), Some("bad"));
        assert!(!status.is_scheduled());
    }

    #[test]
    fn scheduled_exposes_job_id() {
        let job_id = Uuid::new_v4();
        let status = ScheduleStatus::Scheduled {
            job_id,
            cron: "* * * * *".to_owned(),
            next_fire: None,
        };
        assert!(status.is_scheduled());
        assert_eq!(status.job_id(), Some(job_id));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "scheduled");
        assert_eq!(json["jobId"], job_id.to_string());
    }
}
