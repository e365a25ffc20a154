//! Reminder template lifecycle: CRUD plus keeping the job table in step.
//!
//! Store writes and job (re)registration for one template id run inside a
//! per-id critical section, so concurrent updates of the same template can
//! never leave a job built from a stale snapshot. Different ids do not
//! contend.

use crate::channels::DispatchReport;
use crate::error::{BoardError, Result};
use crate::reminders::store::{TemplatePage, TemplateStore};
use crate::reminders::template::{NewTemplate, ReminderTemplate, TemplateId, TemplatePatch};
use crate::scheduler::{JobStatus, ReminderScheduler, ScheduleStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// A template together with its scheduling state after the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTemplate {
    pub template: ReminderTemplate,
    pub schedule: ScheduleStatus,
}

/// Result of a manual trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub ok: bool,
    /// Key of the triggered template.
    pub triggered: String,
    pub report: DispatchReport,
}

/// Startup job registration summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSummary {
    pub scheduled: usize,
    pub invalid_cron: usize,
}

/// Live job table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsOverview {
    pub total: usize,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<TemplateId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn for_id(&self, id: TemplateId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    fn forget(&self, id: TemplateId) {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }
}

/// Reminder template service.
#[derive(Debug)]
pub struct ReminderService {
    store: TemplateStore,
    scheduler: ReminderScheduler,
    locks: KeyedLocks,
    default_page_size: usize,
}

impl ReminderService {
    /// Build a service over `store`, registering jobs on `scheduler`.
    pub fn new(store: TemplateStore, scheduler: ReminderScheduler) -> Self {
        Self {
            store,
            scheduler,
            locks: KeyedLocks::default(),
            default_page_size: 50,
        }
    }

    /// Page size used by [`ReminderService::list_templates`] when none is given.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// The job scheduler.
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// The template store.
    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Create a template and register its job when enabled with a cron.
    ///
    /// An invalid cron does not fail the call: the template is kept and the
    /// returned schedule is [`ScheduleStatus::InvalidCron`].
    ///
    /// # Errors
    ///
    /// [`BoardError::DuplicateKey`] and other store errors.
    pub fn create_template(&self, new: NewTemplate) -> Result<ScheduledTemplate> {
        let created = self.store.insert(new)?;
        self.schedule_created(created)
    }

    /// Register the job for a freshly inserted template under its id lock.
    fn schedule_created(&self, created: ReminderTemplate) -> Result<ScheduledTemplate> {
        let lock = self.locks.for_id(created.id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        // Schedule from the stored copy; an update may have landed in between.
        // A delete that won the race leaves nothing to schedule.
        let Some(template) = self.store.get(created.id) else {
            warn!("reminder template {} was deleted before its job was registered", created.id);
            return Ok(ScheduledTemplate {
                template: created,
                schedule: ScheduleStatus::Unscheduled,
            });
        };
        let schedule = self.scheduler.schedule(&template)?;
        info!("created reminder template '{}' ({})", template.key, template.id);
        Ok(ScheduledTemplate { template, schedule })
    }

    /// Apply `patch` and reschedule.
    ///
    /// Any non-empty patch cancels the template's job and registers a new
    /// one, whether or not the schedule fields changed. An empty patch is a
    /// plain read.
    ///
    /// # Errors
    ///
    /// [`BoardError::TemplateNotFound`], [`BoardError::DuplicateKey`] and
    /// other store errors.
    pub fn update_template(&self, id: TemplateId, patch: TemplatePatch) -> Result<ScheduledTemplate> {
        let lock = self.locks.for_id(id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if patch.is_empty() {
            let template = self.store.get(id).ok_or(BoardError::TemplateNotFound(id))?;
            let schedule = self.scheduler.status_of(&template);
            return Ok(ScheduledTemplate { template, schedule });
        }

        let template = self.store.update(id, patch)?;
        let schedule = self.scheduler.schedule(&template)?;
        info!("updated reminder template '{}' ({id})", template.key);
        Ok(ScheduledTemplate { template, schedule })
    }

    /// Cancel the template's job, then remove it. Returns `true` when it existed.
    ///
    /// # Errors
    ///
    /// Returns a store error if the removal cannot be persisted.
    pub fn delete_template(&self, id: TemplateId) -> Result<bool> {
        let lock = self.locks.for_id(id);
        let deleted = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.scheduler.unschedule(id);
            self.store.delete(id)?
        };
        if deleted {
            self.locks.forget(id);
            info!("deleted reminder template {id}");
        }
        Ok(deleted)
    }

    /// Look up a template.
    pub fn get_template(&self, id: TemplateId) -> Option<ReminderTemplate> {
        self.store.get(id)
    }

    /// Page through templates, newest first.
    pub fn list_templates(&self, limit: Option<usize>, offset: Option<usize>) -> TemplatePage {
        self.store
            .list(limit.unwrap_or(self.default_page_size), offset.unwrap_or(0))
    }

    /// Dispatch a template right now, outside its schedule.
    ///
    /// # Errors
    ///
    /// [`BoardError::TemplateNotFound`] for an unknown id.
    pub async fn trigger_reminder(&self, id: TemplateId) -> Result<TriggerResult> {
        let template = self.store.get(id).ok_or(BoardError::TemplateNotFound(id))?;
        let report = self
            .scheduler
            .dispatcher()
            .dispatch(&template.channel_ids, template.payload())
            .await;
        Ok(TriggerResult {
            ok: true,
            triggered: template.key,
            report,
        })
    }

    /// Register jobs for every enabled, cron-bearing stored template.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Scheduler`] when called outside a tokio runtime.
    pub fn initialize_scheduled_jobs(&self) -> Result<InitSummary> {
        let mut summary = InitSummary::default();
        for template in self.store.schedulable() {
            let lock = self.locks.for_id(template.id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            match self.scheduler.schedule(&template)? {
                ScheduleStatus::Scheduled { .. } => summary.scheduled += 1,
                ScheduleStatus::InvalidCron { error } => {
                    warn!("stored template '{}' has invalid cron: {error}", template.key);
                    summary.invalid_cron += 1;
                }
                ScheduleStatus::Disabled | ScheduleStatus::Unscheduled => {}
            }
        }
        info!(
            "initialized {} reminder job(s), {} with invalid cron",
            summary.scheduled, summary.invalid_cron
        );
        Ok(summary)
    }

    /// Snapshot of live jobs.
    pub fn jobs_status(&self) -> JobsOverview {
        let jobs = self.scheduler.jobs();
        JobsOverview {
            total: jobs.len(),
            jobs,
        }
    }

    /// Cancel all jobs.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::channels::{ChannelRegistry, Dispatcher};

    fn service() -> ReminderService {
        let scheduler = ReminderScheduler::new(Dispatcher::new(ChannelRegistry::default()));
        ReminderService::new(TemplateStore::in_memory(), scheduler)
    }

    fn every_minute(key: &str) -> NewTemplate {
        NewTemplate::new(key)
            .title("t")
            .body("b")
            .cron("* * * * *")
            .channels([1])
    }

    #[tokio::test]
    async fn create_enabled_template_schedules_one_job() {
        let svc = service();
        let created = svc.create_template(every_minute("t1")).unwrap();
        assert!(created.schedule.is_scheduled());
        assert_eq!(svc.scheduler().job_count(), 1);
        assert!(svc.scheduler().is_scheduled(created.template.id));
    }

    #[tokio::test]
    async fn update_of_non_schedule_fields_still_reschedules() {
        let svc = service();
        let created = svc.create_template(every_minute("t1")).unwrap();
        let first_job = created.schedule.job_id().unwrap();

        let patch = TemplatePatch {
            title: Some("new".to_owned()),
            body: Some("y".to_owned()),
            ..TemplatePatch::default()
        };
        let updated = svc.update_template(created.template.id, patch).unwrap();

        let second_job = updated.schedule.job_id().unwrap();
        assert_ne!(first_job, second_job);
        assert_eq!(svc.scheduler().job_count(), 1);
        assert_eq!(updated.template.schedule_cron.as_deref(), Some("* * * * *"));
    }

    #[tokio::test]
    async fn empty_patch_does_not_reschedule() {
        let svc = service();
        let created = svc.create_template(every_minute("t1")).unwrap();
        let before = created.schedule.job_id();
        let after = svc
            .update_template(created.template.id, TemplatePatch::default())
            .unwrap();
        assert_eq!(after.schedule.job_id(), before);
    }

    #[tokio::test]
    async fn disable_and_delete_leave_no_job() {
        let svc = service();
        let a = svc.create_template(every_minute("a")).unwrap().template;
        let b = svc.create_template(every_minute("b")).unwrap().template;

        let disabled = svc
            .update_template(
                a.id,
                TemplatePatch {
                    enabled: Some(false),
                    ..TemplatePatch::default()
                },
            )
            .unwrap();
        assert_eq!(disabled.schedule, ScheduleStatus::Disabled);
        assert!(!svc.scheduler().is_scheduled(a.id));

        assert!(svc.delete_template(b.id).unwrap());
        assert!(!svc.scheduler().is_scheduled(b.id));
        assert!(svc.get_template(b.id).is_none());
        assert_eq!(svc.scheduler().job_count(), 0);
    }

    #[tokio::test]
    async fn create_racing_a_delete_registers_no_job() {
        let svc = service();
        let created = svc.store().insert(every_minute("short-lived")).unwrap();
        assert!(svc.delete_template(created.id).unwrap());

        let result = svc.schedule_created(created).unwrap();
        assert_eq!(result.schedule, ScheduleStatus::Unscheduled);
        assert_eq!(svc.scheduler().job_count(), 0);
        assert!(svc.get_template(result.template.id).is_none());
    }

    #[tokio::test]
    async fn invalid_cron_is_a_warning_not_an_error() {
        let svc = service();
        let created = svc
            .create_template(NewTemplate::new("bad").cron("every morning"))
            .unwrap();
        assert!(created.schedule.warning().is_some());
        assert!(svc.get_template(created.template.id).is_some());
        assert_eq!(svc.scheduler().job_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_key_propagates() {
        let svc = service();
        svc.create_template(every_minute("t1")).unwrap();
        let err = svc.create_template(every_minute("t1")).unwrap_err();
        assert!(matches!(err, BoardError::DuplicateKey(_)));
        assert_eq!(svc.scheduler().job_count(), 1);
    }

    #[tokio::test]
    async fn update_unknown_template_is_not_found() {
        let svc = service();
        let patch = TemplatePatch {
            title: Some("x".to_owned()),
            ..TemplatePatch::default()
        };
        assert!(matches!(
            svc.update_template(42, patch),
            Err(BoardError::TemplateNotFound(42))
        ));
        assert!(matches!(
            svc.update_template(42, TemplatePatch::default()),
            Err(BoardError::TemplateNotFound(42))
        ));
    }

    #[tokio::test]
    async fn trigger_unknown_template_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.trigger_reminder(7).await,
            Err(BoardError::TemplateNotFound(7))
        ));
    }

    #[tokio::test]
    async fn trigger_reports_skipped_unknown_channels() {
        let svc = service();
        let t = svc.create_template(every_minute("t1")).unwrap().template;
        let result = svc.trigger_reminder(t.id).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.triggered, "t1");
        assert_eq!(result.report.skipped(), 1);
    }

    #[tokio::test]
    async fn initialize_registers_stored_templates() {
        let store = TemplateStore::in_memory();
        store.insert(NewTemplate::new("a").cron("* * * * *")).unwrap();
        store.insert(NewTemplate::new("b").cron("bogus")).unwrap();
        store
            .insert(NewTemplate::new("c").cron("* * * * *").enabled(false))
            .unwrap();
        let scheduler = ReminderScheduler::new(Dispatcher::new(ChannelRegistry::default()));
        let svc = ReminderService::new(store, scheduler);

        let summary = svc.initialize_scheduled_jobs().unwrap();
        assert_eq!(summary.scheduled, 1);
        assert_eq!(summary.invalid_cron, 1);
        assert_eq!(svc.jobs_status().total, 1);
    }

    #[tokio::test]
    async fn list_uses_default_page_size() {
        let svc = service().with_default_page_size(2);
        for key in ["a", "b", "c"] {
            svc.create_template(NewTemplate::new(key)).unwrap();
        }
        let page = svc.list_templates(None, None);
        assert_eq!(page.limit, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_keep_a_single_job() {
        let svc = Arc::new(service());
        let id = svc.create_template(every_minute("race")).unwrap().template.id;

        let mut handles = Vec::new();
        for i in 0..16 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                let patch = TemplatePatch {
                    title: Some(format!("title {i}")),
                    ..TemplatePatch::default()
                };
                svc.update_template(id, patch).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(svc.scheduler().job_count(), 1);
        assert_eq!(svc.jobs_status().jobs[0].template_id, id);
    }
}
