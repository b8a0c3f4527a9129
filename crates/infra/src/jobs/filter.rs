//! Typed predicates and updates over persisted job documents.
//!
//! Both backends interpret these the same way: the in-memory store evaluates
//! them directly against [`JobRecord`]s, the Postgres store compiles them to
//! SQL. An unset field never equals a concrete value, so `Complete(false)`
//! does not match an unstarted job while `NotComplete` does.

use chrono::{DateTime, Utc};

use jobstate_core::{AuthorizationStrategy, JobId, JobRecord, JobResults, ProgressType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    Id(JobId),
    Owner(String),
    /// The share list contains the user.
    SharedWith(String),
    ServiceUnset,
    ServiceSet,
    Service(String),
    ServiceIn(Vec<String>),
    Complete(bool),
    /// `complete` is anything but `true`, including unset.
    NotComplete,
    Error(bool),
    /// Whether a canceler is recorded.
    Canceled(bool),
    AuthStrategy(AuthorizationStrategy),
    AuthParamIn(Vec<String>),
    And(Vec<JobFilter>),
    Or(Vec<JobFilter>),
}

impl JobFilter {
    pub fn and(filters: impl IntoIterator<Item = JobFilter>) -> Self {
        JobFilter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = JobFilter>) -> Self {
        JobFilter::Or(filters.into_iter().collect())
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        match self {
            JobFilter::Id(id) => record.id == *id,
            JobFilter::Owner(user) => record.user == *user,
            JobFilter::SharedWith(user) => record.shared.iter().any(|s| s == user),
            JobFilter::ServiceUnset => record.service.is_none(),
            JobFilter::ServiceSet => record.service.is_some(),
            JobFilter::Service(service) => record.service.as_deref() == Some(service.as_str()),
            JobFilter::ServiceIn(services) => record
                .service
                .as_ref()
                .is_some_and(|s| services.contains(s)),
            JobFilter::Complete(value) => record.complete == Some(*value),
            JobFilter::NotComplete => record.complete != Some(true),
            JobFilter::Error(value) => record.error == Some(*value),
            JobFilter::Canceled(value) => record.canceled_by.is_some() == *value,
            JobFilter::AuthStrategy(strategy) => record.auth_strategy == *strategy,
            JobFilter::AuthParamIn(params) => params.contains(&record.auth_param),
            JobFilter::And(filters) => filters.iter().all(|f| f.matches(record)),
            JobFilter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// One field assignment in a [`JobUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Service(String),
    Status(Option<String>),
    Description(Option<String>),
    ProgressType(ProgressType),
    Progress(i64),
    MaxProgress(Option<i64>),
    Started(DateTime<Utc>),
    Updated(DateTime<Utc>),
    EstComplete(Option<DateTime<Utc>>),
    Complete(bool),
    Error(bool),
    ErrorMessage(Option<String>),
    Results(Option<JobResults>),
    CanceledBy(String),
}

impl FieldValue {
    /// Persisted field name.
    pub fn field(&self) -> &'static str {
        match self {
            FieldValue::Service(_) => "service",
            FieldValue::Status(_) => "status",
            FieldValue::Description(_) => "desc",
            FieldValue::ProgressType(_) => "progtype",
            FieldValue::Progress(_) => "prog",
            FieldValue::MaxProgress(_) => "maxprog",
            FieldValue::Started(_) => "started",
            FieldValue::Updated(_) => "updated",
            FieldValue::EstComplete(_) => "estcompl",
            FieldValue::Complete(_) => "complete",
            FieldValue::Error(_) => "error",
            FieldValue::ErrorMessage(_) => "errormsg",
            FieldValue::Results(_) => "results",
            FieldValue::CanceledBy(_) => "canceledby",
        }
    }

    fn apply(&self, record: &mut JobRecord) {
        match self {
            FieldValue::Service(v) => record.service = Some(v.clone()),
            FieldValue::Status(v) => record.status = v.clone(),
            FieldValue::Description(v) => record.description = v.clone(),
            FieldValue::ProgressType(v) => record.progress_type = Some(*v),
            FieldValue::Progress(v) => record.progress = Some(*v),
            FieldValue::MaxProgress(v) => record.max_progress = *v,
            FieldValue::Started(v) => record.started = Some(*v),
            FieldValue::Updated(v) => record.updated = *v,
            FieldValue::EstComplete(v) => record.est_complete = *v,
            FieldValue::Complete(v) => record.complete = Some(*v),
            FieldValue::Error(v) => record.error = Some(*v),
            FieldValue::ErrorMessage(v) => record.error_message = v.clone(),
            FieldValue::Results(v) => record.results = v.clone(),
            FieldValue::CanceledBy(v) => record.canceled_by = Some(v.clone()),
        }
    }
}

/// Field assignments, a progress increment and share-list edits applied
/// together to each matching document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    set: Vec<FieldValue>,
    inc_progress: Option<i64>,
    add_shared: Vec<String>,
    remove_shared: Vec<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, value: FieldValue) -> Self {
        self.set.push(value);
        self
    }

    pub fn inc_progress(mut self, delta: i64) -> Self {
        self.inc_progress = Some(self.inc_progress.unwrap_or(0) + delta);
        self
    }

    /// Add users to the share list; users already present are skipped.
    pub fn add_shared(mut self, users: impl IntoIterator<Item = String>) -> Self {
        for user in users {
            if !self.add_shared.contains(&user) {
                self.add_shared.push(user);
            }
        }
        self
    }

    pub fn remove_shared(mut self, users: impl IntoIterator<Item = String>) -> Self {
        for user in users {
            if !self.remove_shared.contains(&user) {
                self.remove_shared.push(user);
            }
        }
        self
    }

    pub fn assignments(&self) -> &[FieldValue] {
        &self.set
    }

    pub fn progress_increment(&self) -> Option<i64> {
        self.inc_progress
    }

    pub fn shared_additions(&self) -> &[String] {
        &self.add_shared
    }

    pub fn shared_removals(&self) -> &[String] {
        &self.remove_shared
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.inc_progress.is_none()
            && self.add_shared.is_empty()
            && self.remove_shared.is_empty()
    }

    pub fn apply(&self, record: &mut JobRecord) {
        for value in &self.set {
            value.apply(record);
        }
        if let Some(delta) = self.inc_progress {
            record.progress = Some(record.progress.unwrap_or(0) + delta);
        }
        for user in &self.add_shared {
            if !record.shared.contains(user) {
                record.shared.push(user.clone());
            }
        }
        if !self.remove_shared.is_empty() {
            record.shared.retain(|u| !self.remove_shared.contains(u));
        }
    }
}
