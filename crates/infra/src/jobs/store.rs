//! Job document storage.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use jobstate_core::{JobId, JobRecord};

use super::filter::{JobFilter, JobUpdate};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Document store for jobs.
///
/// `update` and `delete` apply to every document matching the filter and
/// report how many matched; each is atomic with respect to its filter, which
/// is the only concurrency control the engine relies on.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the indexes listing and authorization queries rely on.
    async fn ensure_indexes(&self) -> Result<(), StoreError>;

    async fn insert(&self, record: JobRecord) -> Result<(), StoreError>;

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobRecord>, StoreError>;

    /// All matching documents, oldest first.
    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError>;

    async fn update(&self, filter: &JobFilter, update: &JobUpdate) -> Result<u64, StoreError>;

    async fn delete(&self, filter: &JobFilter) -> Result<u64, StoreError>;

    /// Distinct non-null service names over matching documents.
    async fn distinct_services(&self, filter: &JobFilter) -> Result<BTreeSet<String>, StoreError>;
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        (**self).ensure_indexes().await
    }

    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        (**self).insert(record).await
    }

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobRecord>, StoreError> {
        (**self).find_one(filter).await
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        (**self).find(filter).await
    }

    async fn update(&self, filter: &JobFilter, update: &JobUpdate) -> Result<u64, StoreError> {
        (**self).update(filter, update).await
    }

    async fn delete(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        (**self).delete(filter).await
    }

    async fn distinct_services(&self, filter: &JobFilter) -> Result<BTreeSet<String>, StoreError> {
        (**self).distinct_services(filter).await
    }
}

/// In-memory job store for tests/dev.
///
/// Documents are keyed by their time-ordered ids, so iteration order is
/// creation order.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&record.id) {
            return Err(StoreError::DuplicateKey(record.id.to_string()));
        }
        jobs.insert(record.id, record);
        Ok(())
    }

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.values().find(|r| filter.matches(r)).cloned())
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn update(&self, filter: &JobFilter, update: &JobUpdate) -> Result<u64, StoreError> {
        // Match and apply under one write lock.
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut matched = 0;
        for record in jobs.values_mut().filter(|r| filter.matches(r)) {
            update.apply(record);
            matched += 1;
        }
        Ok(matched)
    }

    async fn delete(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let before = jobs.len();
        jobs.retain(|_, r| !filter.matches(r));
        Ok((before - jobs.len()) as u64)
    }

    async fn distinct_services(&self, filter: &JobFilter) -> Result<BTreeSet<String>, StoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs
            .values()
            .filter(|r| filter.matches(r))
            .filter_map(|r| r.service.clone())
            .collect())
    }
}
