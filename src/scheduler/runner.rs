//! Reminder job table and job loop.
//!
//! Each live job is a tokio task that sleeps until the next cron occurrence,
//! dispatches the template snapshot it was registered with, and repeats.
//! Dispatch outcomes never stop the loop; only cancellation does.

use crate::channels::Dispatcher;
use crate::reminders::{ReminderTemplate, TemplateId};
use crate::scheduler::cron::CronSchedule;
use crate::scheduler::tasks::{JobStatus, ScheduleStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct JobEntry {
    job_id: Uuid,
    template_key: String,
    cron: CronSchedule,
    registered_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Owns the template-id → job table.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct ReminderScheduler {
    jobs: Arc<Mutex<HashMap<TemplateId, JobEntry>>>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("jobs", &self.job_count())
            .finish()
    }
}

impl ReminderScheduler {
    /// Create a scheduler dispatching through `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            dispatcher,
        }
    }

    /// The dispatcher jobs fire through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn table(&self) -> MutexGuard<'_, HashMap<TemplateId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel any job for `template` and register a fresh one when it is
    /// enabled and carries a valid cron expression.
    ///
    /// Always replaces the existing job, even when nothing schedule-related
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BoardError::Scheduler`] when called outside a tokio runtime.
    pub fn schedule(&self, template: &ReminderTemplate) -> crate::Result<ScheduleStatus> {
        let mut jobs = self.table();
        if let Some(old) = jobs.remove(&template.id) {
            old.handle.abort();
            debug!("cancelled job {} for template {}", old.job_id, template.id);
        }

        if !template.enabled {
            return Ok(ScheduleStatus::Disabled);
        }
        let Some(expression) = template
            .schedule_cron
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        else {
            return Ok(ScheduleStatus::Unscheduled);
        };
        let cron = match CronSchedule::parse(expression) {
            Ok(cron) => cron,
            Err(error) => {
                warn!("template '{}' not scheduled: {error}", template.key);
                return Ok(ScheduleStatus::InvalidCron { error });
            }
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            crate::BoardError::Scheduler(format!("no tokio runtime to run jobs on: {e}"))
        })?;

        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let next_fire = cron.next_after(now);
        let handle = runtime.spawn(run_job(
            template.clone(),
            cron.clone(),
            self.dispatcher.clone(),
        ));
        jobs.insert(
            template.id,
            JobEntry {
                job_id,
                template_key: template.key.clone(),
                cron: cron.clone(),
                registered_at: now,
                handle,
            },
        );
        debug!(
            "scheduled template '{}' ({}) as job {job_id}, cron `{cron}`",
            template.key, template.id
        );

        Ok(ScheduleStatus::Scheduled {
            job_id,
            cron: cron.expression().to_owned(),
            next_fire,
        })
    }

    /// Cancel the job for `template_id`. Returns `true` when one existed.
    ///
    /// The job task is aborted before this returns; it will not fire again.
    pub fn unschedule(&self, template_id: TemplateId) -> bool {
        match self.table().remove(&template_id) {
            Some(entry) => {
                entry.handle.abort();
                debug!("unscheduled job {} for template {template_id}", entry.job_id);
                true
            }
            None => false,
        }
    }

    /// Whether a job is registered for `template_id`.
    pub fn is_scheduled(&self, template_id: TemplateId) -> bool {
        self.table().contains_key(&template_id)
    }

    /// Registration id of the live job for `template_id`.
    pub fn job_id(&self, template_id: TemplateId) -> Option<Uuid> {
        self.table().get(&template_id).map(|e| e.job_id)
    }

    /// Current scheduling state of a template as seen by the job table.
    pub fn status_of(&self, template: &ReminderTemplate) -> ScheduleStatus {
        if let Some(entry) = self.table().get(&template.id) {
            return ScheduleStatus::Scheduled {
                job_id: entry.job_id,
                cron: entry.cron.expression().to_owned(),
                next_fire: entry.cron.next_after(Utc::now()),
            };
        }
        if !template.enabled {
            return ScheduleStatus::Disabled;
        }
        match template.schedule_cron.as_deref().map(CronSchedule::parse) {
            None => ScheduleStatus::Unscheduled,
            Some(Err(error)) => ScheduleStatus::InvalidCron { error },
            // Valid but not registered (e.g. never initialized).
            Some(Ok(_)) => ScheduleStatus::Unscheduled,
        }
    }

    /// Number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.table().len()
    }

    /// Snapshot of the job table ordered by template id.
    pub fn jobs(&self) -> Vec<JobStatus> {
        let now = Utc::now();
        let mut jobs: Vec<JobStatus> = self
            .table()
            .iter()
            .map(|(&template_id, entry)| JobStatus {
                template_id,
                template_key: entry.template_key.clone(),
                job_id: entry.job_id,
                cron: entry.cron.expression().to_owned(),
                next_fire: entry.cron.next_after(now),
                running: !entry.handle.is_finished(),
                registered_at: entry.registered_at,
            })
            .collect();
        jobs.sort_by_key(|j| j.template_id);
        jobs
    }

    /// Cancel every job.
    pub fn shutdown(&self) {
        let mut jobs = self.table();
        let count = jobs.len();
        for (_, entry) in jobs.drain() {
            entry.handle.abort();
        }
        info!("scheduler stopped, {count} job(s) cancelled");
    }
}

async fn run_job(template: ReminderTemplate, cron: CronSchedule, dispatcher: Dispatcher) {
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        // Never fire twice for the same occurrence if the timer wakes early.
        let anchor = last_fire.map_or(now, |last| last.max(now));
        let Some(next) = cron.next_after(anchor) else {
            warn!("template '{}' has no future occurrence, job ends", template.key);
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last_fire = Some(next);

        let report = dispatcher
            .dispatch(&template.channel_ids, template.payload())
            .await;
        info!(
            "reminder '{}' fired: {} delivered, {} failed, {} skipped",
            template.key,
            report.delivered(),
            report.failed(),
            report.skipped()
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::channels::ChannelRegistry;

    fn scheduler() -> ReminderScheduler {
        ReminderScheduler::new(Dispatcher::new(ChannelRegistry::default()))
    }

    fn template(id: TemplateId, cron: Option<&str>, enabled: bool) -> ReminderTemplate {
        let mut t = ReminderTemplate::new(id, format!("t{id}"));
        t.schedule_cron = cron.map(str::to_owned);
        t.enabled = enabled;
        t
    }

    #[tokio::test]
    async fn enabled_template_with_cron_gets_one_job() {
        let s = scheduler();
        let status = s.schedule(&template(101, Some("* * * * *"), true)).unwrap();
        assert!(status.is_scheduled());
        assert_eq!(s.job_count(), 1);
        assert_eq!(s.job_id(101), status.job_id());
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_job() {
        let s = scheduler();
        let t = template(101, Some("* * * * *"), true);
        let first = s.schedule(&t).unwrap().job_id().unwrap();
        let second = s.schedule(&t).unwrap().job_id().unwrap();
        assert_ne!(first, second);
        assert_eq!(s.job_count(), 1);
        assert_eq!(s.job_id(101), Some(second));
    }

    #[tokio::test]
    async fn disabling_cancels_the_job() {
        let s = scheduler();
        s.schedule(&template(7, Some("* * * * *"), true)).unwrap();
        let status = s.schedule(&template(7, Some("* * * * *"), false)).unwrap();
        assert_eq!(status, ScheduleStatus::Disabled);
        assert!(!s.is_scheduled(7));
    }

    #[tokio::test]
    async fn missing_or_invalid_cron_leaves_no_job() {
        let s = scheduler();
        assert_eq!(
            s.schedule(&template(1, None, true)).unwrap(),
            ScheduleStatus::Unscheduled
        );
        assert_eq!(
            s.schedule(&template(2, Some("  "), true)).unwrap(),
            ScheduleStatus::Unscheduled
        );
        let invalid = s.schedule(&template(3, Some("every tuesday"), true)).unwrap();
        assert!(invalid.warning().is_some());
        assert_eq!(s.job_count(), 0);
    }

    #[tokio::test]
    async fn invalid_cron_on_update_cancels_previous_job() {
        let s = scheduler();
        s.schedule(&template(4, Some("* * * * *"), true)).unwrap();
        let status = s.schedule(&template(4, Some("nope"), true)).unwrap();
        assert!(matches!(status, ScheduleStatus::InvalidCron { .. }));
        assert!(!s.is_scheduled(4));
    }

    #[tokio::test]
    async fn unschedule_and_shutdown() {
        let s = scheduler();
        s.schedule(&template(1, Some("* * * * *"), true)).unwrap();
        s.schedule(&template(2, Some("0 6 * * *"), true)).unwrap();
        assert!(s.unschedule(1));
        assert!(!s.unschedule(1));
        assert_eq!(s.job_count(), 1);

        let jobs = s.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].template_id, 2);
        assert!(jobs[0].running);
        assert!(jobs[0].next_fire.is_some());

        s.shutdown();
        assert_eq!(s.job_count(), 0);
    }

    #[tokio::test]
    async fn status_of_reflects_table_and_template() {
        let s = scheduler();
        let t = template(5, Some("* * * * *"), true);
        assert_eq!(s.status_of(&t), ScheduleStatus::Unscheduled);
        s.schedule(&t).unwrap();
        assert!(s.status_of(&t).is_scheduled());
        assert_eq!(s.status_of(&template(6, None, false)), ScheduleStatus::Disabled);
    }

    #[test]
    fn scheduling_outside_runtime_is_an_error() {
        let s = scheduler();
        let result = s.schedule(&template(1, Some("* * * * *"), true));
        assert!(matches!(result, Err(crate::BoardError::Scheduler(_))));
        assert_eq!(s.job_count(), 0);
    }
}
