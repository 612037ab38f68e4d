use super::state::{Job, JobId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// All live jobs by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<Job>) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id, job);
    }

    pub fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach terminal jobs whose last update is older than `retention`.
    pub fn take_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<Arc<Job>> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| {
                job.state.status().is_terminal()
                    && now.signed_duration_since(job.state.updated_at()) > retention
            })
            .map(|job| job.id)
            .collect();
        expired.iter().filter_map(|id| jobs.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CleanserError;
    use crate::export::ExportOptions;
    use crate::pipeline::RuleSet;

    fn job() -> Arc<Job> {
        Arc::new(Job::new("u", RuleSet::default(), ExportOptions::default()))
    }

    #[test]
    fn test_only_old_terminal_jobs_expire() {
        let registry = JobRegistry::new();
        let queued = job();
        let failed = job();
        failed.state.claim();
        failed.state.fail(&CleanserError::Other("boom".to_owned()));
        registry.insert(Arc::clone(&queued));
        registry.insert(Arc::clone(&failed));

        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(registry.take_expired(Utc::now(), Duration::from_secs(3600)).is_empty());

        let expired = registry.take_expired(later, Duration::from_secs(3600));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired.first().map(|j| j.id), Some(failed.id));
        assert!(registry.get(queued.id).is_some(), "queued job kept");
        assert!(registry.get(failed.id).is_none(), "expired job removed");
    }
}
