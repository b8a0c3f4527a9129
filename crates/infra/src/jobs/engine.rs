//! Job lifecycle engine.
//!
//! Every transition is a single conditional update whose filter encodes the
//! source state it requires. Zero matches means the precondition failed;
//! nothing is retried, so a lost race is reported to the caller rather than
//! applied twice.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use jobstate_auth::{Authorizer, AuthzError};
use jobstate_core::validate::{
    MAX_LEN_DESC, MAX_LEN_ERR, MAX_LEN_SERVICE, MAX_LEN_STATUS, MAX_LEN_USER, check_max_len,
    check_string,
};
use jobstate_core::{
    AuthorizationStrategy, DEFAULT_AUTH_PARAM, Job, JobId, JobMetadata, JobRecord, JobResults,
    ProgressSpec,
};

use super::error::{JobStateError, JobStateResult};
use super::filter::{FieldValue, JobFilter, JobUpdate};
use super::store::JobStore;
use crate::schema::SchemaManager;

/// Schema type recorded for the jobs collection.
pub const SCHEMA_TYPE: &str = "jobstate";
pub const SCHEMA_VERSION: u32 = 2;

/// Move an unstarted job owned by `user` into the started stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartJob {
    pub user: String,
    pub job_id: String,
    pub service: String,
    pub status: Option<String>,
    pub description: Option<String>,
    pub progress: ProgressSpec,
    pub est_complete: Option<DateTime<Utc>>,
}

/// Create a default-strategy job and start it in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAndStartJob {
    pub user: String,
    pub service: String,
    pub status: Option<String>,
    pub description: Option<String>,
    pub progress: ProgressSpec,
    pub est_complete: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateJob {
    pub user: String,
    pub job_id: String,
    pub service: String,
    pub status: Option<String>,
    /// Added to the current progress.
    pub progress: Option<u32>,
    pub est_complete: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteJob {
    pub user: String,
    pub job_id: String,
    pub service: String,
    pub status: Option<String>,
    /// Set when the job failed.
    pub error: Option<String>,
    pub results: Option<JobResults>,
}

/// Stage and visibility facets for [`ListJobs`].
///
/// Stage facets are OR-ed together; with none set every stage is listed.
/// `shared` adds jobs shared with the caller to the owned ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFacets {
    pub running: bool,
    pub complete: bool,
    pub canceled: bool,
    pub error: bool,
    pub shared: bool,
}

impl JobFacets {
    pub fn is_empty(&self) -> bool {
        !(self.running || self.complete || self.canceled || self.error || self.shared)
    }

    fn stage_filter(&self) -> Option<JobFilter> {
        let mut stages = Vec::new();
        if self.running {
            stages.push(JobFilter::Complete(false));
        }
        if self.complete {
            stages.push(JobFilter::and([
                JobFilter::Complete(true),
                JobFilter::Error(false),
                JobFilter::Canceled(false),
            ]));
        }
        if self.canceled {
            stages.push(JobFilter::Canceled(true));
        }
        if self.error {
            stages.push(JobFilter::Error(true));
        }
        if stages.is_empty() {
            None
        } else {
            Some(JobFilter::Or(stages))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListJobs {
    pub user: String,
    /// Restrict to these services; empty means any.
    pub services: Vec<String>,
    pub facets: JobFacets,
    pub strategy: AuthorizationStrategy,
    pub auth_params: Vec<String>,
}

impl ListJobs {
    /// Default-strategy listing of everything visible to `user`.
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            services: Vec::new(),
            facets: JobFacets::default(),
            strategy: AuthorizationStrategy::DEFAULT,
            auth_params: vec![DEFAULT_AUTH_PARAM.to_string()],
        }
    }

    pub fn services(mut self, services: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn facets(mut self, facets: JobFacets) -> Self {
        self.facets = facets;
        self
    }

    /// List jobs created under `strategy` with any of `auth_params`.
    pub fn strategy(
        mut self,
        strategy: AuthorizationStrategy,
        auth_params: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.strategy = strategy;
        self.auth_params = auth_params.into_iter().map(Into::into).collect();
        self
    }
}

/// The job lifecycle engine over a [`JobStore`].
#[derive(Debug)]
pub struct JobState<S> {
    store: S,
}

impl<S: JobStore> JobState<S> {
    /// Ensure indexes and pass the schema gate before accepting work.
    pub async fn new(store: S, schema: &SchemaManager) -> JobStateResult<Self> {
        store.ensure_indexes().await?;
        schema.check_and_upgrade(SCHEMA_TYPE, SCHEMA_VERSION).await?;
        Ok(Self { store })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create_job(
        &self,
        user: &str,
        authorizer: &Authorizer,
        strategy: &AuthorizationStrategy,
        auth_param: &str,
        metadata: &JobMetadata,
    ) -> JobStateResult<JobId> {
        check_string(user, "user", Some(MAX_LEN_USER))?;
        authorizer.authorize_create(strategy, auth_param).await?;

        let id = JobId::new();
        let record = JobRecord::unstarted(
            id,
            user,
            strategy.clone(),
            auth_param,
            metadata,
            Utc::now(),
        );
        self.store.insert(record).await?;
        tracing::info!(job_id = %id, user, %strategy, "job created");
        Ok(id)
    }

    pub async fn start_job(&self, cmd: StartJob) -> JobStateResult<()> {
        check_string(&cmd.user, "user", Some(MAX_LEN_USER))?;
        let id = JobId::parse(&cmd.job_id)?;
        check_string(&cmd.service, "service", Some(MAX_LEN_SERVICE))?;
        check_max_len(cmd.status.as_deref(), "status", MAX_LEN_STATUS)?;
        check_max_len(cmd.description.as_deref(), "description", MAX_LEN_DESC)?;
        let now = Utc::now();
        check_est_complete(cmd.est_complete, now)?;
        if let ProgressSpec::Task { max } = cmd.progress {
            if max < 1 {
                return Err(JobStateError::InvalidInput(
                    "The maximum progress for the job must be > 0".to_string(),
                ));
            }
        }

        let filter = JobFilter::and([
            JobFilter::Id(id),
            JobFilter::Owner(cmd.user.clone()),
            JobFilter::ServiceUnset,
        ]);
        let update = JobUpdate::new()
            .set(FieldValue::Service(cmd.service.clone()))
            .set(FieldValue::Status(cmd.status))
            .set(FieldValue::Description(cmd.description))
            .set(FieldValue::ProgressType(cmd.progress.progress_type()))
            .set(FieldValue::Started(now))
            .set(FieldValue::Updated(now))
            .set(FieldValue::EstComplete(cmd.est_complete))
            .set(FieldValue::Complete(false))
            .set(FieldValue::Error(false))
            .set(FieldValue::ErrorMessage(None))
            .set(FieldValue::Results(None))
            .set(FieldValue::Progress(0))
            .set(FieldValue::MaxProgress(cmd.progress.max().map(i64::from)));

        if self.store.update(&filter, &update).await? != 1 {
            return Err(JobStateError::NoSuchJob(format!(
                "There is no unstarted job {} for user {}",
                cmd.job_id, cmd.user
            )));
        }
        tracing::info!(job_id = %id, user = %cmd.user, service = %cmd.service, "job started");
        Ok(())
    }

    pub async fn create_and_start_job(&self, cmd: CreateAndStartJob) -> JobStateResult<JobId> {
        let id = self
            .create_job(
                &cmd.user,
                &Authorizer::default_only(),
                &AuthorizationStrategy::DEFAULT,
                DEFAULT_AUTH_PARAM,
                &JobMetadata::empty(),
            )
            .await?;
        self.start_job(StartJob {
            user: cmd.user,
            job_id: id.to_string(),
            service: cmd.service,
            status: cmd.status,
            description: cmd.description,
            progress: cmd.progress,
            est_complete: cmd.est_complete,
        })
        .await?;
        Ok(id)
    }

    pub async fn update_job(&self, cmd: UpdateJob) -> JobStateResult<()> {
        check_max_len(cmd.status.as_deref(), "status", MAX_LEN_STATUS)?;
        let filter = started_job_filter(&cmd.user, &cmd.job_id, &cmd.service)?;
        let now = Utc::now();

        let mut update = JobUpdate::new()
            .set(FieldValue::Status(cmd.status))
            .set(FieldValue::Updated(now));
        if let Some(est) = cmd.est_complete {
            check_est_complete(Some(est), now)?;
            update = update.set(FieldValue::EstComplete(Some(est)));
        }
        if let Some(delta) = cmd.progress {
            update = update.inc_progress(i64::from(delta));
        }

        if self.store.update(&filter, &update).await? != 1 {
            return Err(not_uncompleted(&cmd.job_id, &cmd.user, &cmd.service));
        }
        tracing::debug!(job_id = %cmd.job_id, service = %cmd.service, progress = ?cmd.progress, "job updated");
        Ok(())
    }

    pub async fn complete_job(&self, cmd: CompleteJob) -> JobStateResult<()> {
        check_max_len(cmd.status.as_deref(), "status", MAX_LEN_STATUS)?;
        check_max_len(cmd.error.as_deref(), "error", MAX_LEN_ERR)?;
        let filter = started_job_filter(&cmd.user, &cmd.job_id, &cmd.service)?;

        let failed = cmd.error.is_some();
        let update = JobUpdate::new()
            .set(FieldValue::Updated(Utc::now()))
            .set(FieldValue::Complete(true))
            .set(FieldValue::Error(failed))
            .set(FieldValue::ErrorMessage(cmd.error))
            .set(FieldValue::Status(cmd.status))
            .set(FieldValue::Results(cmd.results));

        if self.store.update(&filter, &update).await? != 1 {
            return Err(not_uncompleted(&cmd.job_id, &cmd.user, &cmd.service));
        }
        tracing::info!(job_id = %cmd.job_id, service = %cmd.service, failed, "job completed");
        Ok(())
    }

    pub async fn cancel_job(
        &self,
        user: &str,
        job_id: &str,
        status: Option<&str>,
        authorizer: &Authorizer,
    ) -> JobStateResult<()> {
        check_string(user, "user", Some(MAX_LEN_USER))?;
        check_max_len(status, "status", MAX_LEN_STATUS)?;
        let id = JobId::parse(job_id)?;
        let not_found = || {
            JobStateError::NoSuchJob(format!(
                "There is no job {job_id} that may be canceled by user {user}"
            ))
        };

        let filter = JobFilter::and([JobFilter::Id(id), JobFilter::NotComplete]);
        let job = match self.store.find_one(&filter).await? {
            Some(record) => Job::from(record),
            None => return Err(not_found()),
        };
        authorizer
            .authorize_cancel(user, &job)
            .await
            .map_err(|e| masked(e, not_found))?;

        let update = JobUpdate::new()
            .set(FieldValue::Status(status.map(str::to_string)))
            .set(FieldValue::Updated(Utc::now()))
            .set(FieldValue::CanceledBy(user.to_string()))
            .set(FieldValue::Complete(true))
            .set(FieldValue::Error(false));
        // Completed or deleted since the read.
        if self.store.update(&filter, &update).await? != 1 {
            return Err(not_found());
        }
        tracing::info!(job_id = %id, user, "job canceled");
        Ok(())
    }

    /// Delete a job. Without `service` only completed jobs qualify; with it,
    /// any job reported by that service does.
    pub async fn delete_job(
        &self,
        user: &str,
        job_id: &str,
        service: Option<&str>,
        authorizer: &Authorizer,
    ) -> JobStateResult<()> {
        check_string(user, "user", Some(MAX_LEN_USER))?;
        let id = JobId::parse(job_id)?;
        let not_found = || {
            let suffix = service
                .map(|s| format!(" and service {s}"))
                .unwrap_or_default();
            JobStateError::NoSuchJob(format!(
                "There is no deletable job {job_id} for user {user}{suffix}"
            ))
        };

        let filter = match service {
            None => JobFilter::and([JobFilter::Id(id), JobFilter::Complete(true)]),
            Some(s) => JobFilter::and([JobFilter::Id(id), JobFilter::Service(s.to_string())]),
        };
        let job = match self.store.find_one(&filter).await? {
            Some(record) => Job::from(record),
            None => return Err(not_found()),
        };
        authorizer
            .authorize_delete(user, &job)
            .await
            .map_err(|e| masked(e, not_found))?;

        if self.store.delete(&filter).await? != 1 {
            return Err(not_found());
        }
        tracing::info!(job_id = %id, user, "job deleted");
        Ok(())
    }

    /// Share a default-strategy job. Sharing with the owner or an already
    /// shared user has no effect.
    pub async fn share_job(&self, owner: &str, job_id: &str, users: &[String]) -> JobStateResult<()> {
        let id = check_share_params(owner, job_id, users, "owner")?;
        let additions = users.iter().filter(|u| u.as_str() != owner).cloned();

        let filter = JobFilter::and([
            JobFilter::Id(id),
            JobFilter::Owner(owner.to_string()),
            JobFilter::AuthStrategy(AuthorizationStrategy::DEFAULT),
        ]);
        let update = JobUpdate::new().add_shared(additions);
        if self.store.update(&filter, &update).await? == 1 {
            tracing::info!(job_id = %id, owner, count = users.len(), "job shared");
            return Ok(());
        }

        let owned = JobFilter::and([JobFilter::Id(id), JobFilter::Owner(owner.to_string())]);
        match self.store.find_one(&owned).await? {
            Some(record) => Err(non_default(job_id, &record.auth_strategy)),
            None => Err(JobStateError::NoSuchJob(format!(
                "There is no job {job_id} with default authorization owned by user {owner}"
            ))),
        }
    }

    /// Stop sharing a default-strategy job. Owners may remove anyone; a
    /// shared user may only remove themselves.
    pub async fn unshare_job(&self, user: &str, job_id: &str, users: &[String]) -> JobStateResult<()> {
        let id = check_share_params(user, job_id, users, "user")?;
        let not_found = || {
            JobStateError::NoSuchJob(format!(
                "There is no job {job_id} with default authorization visible to user {user}"
            ))
        };

        let record = match self.store.find_one(&JobFilter::Id(id)).await? {
            Some(record) => record,
            None => return Err(not_found()),
        };
        if !record.auth_strategy.is_default() {
            return if record.user == user {
                Err(non_default(job_id, &record.auth_strategy))
            } else {
                Err(not_found())
            };
        }
        if record.user != user {
            if !record.shared.iter().any(|s| s == user) {
                return Err(not_found());
            }
            if users.len() != 1 || users[0] != user {
                return Err(JobStateError::Unauthorized(format!(
                    "User {user} may only stop sharing job {job_id} for themselves"
                )));
            }
        }

        let filter = JobFilter::and([
            JobFilter::Id(id),
            JobFilter::Owner(record.user.clone()),
            JobFilter::AuthStrategy(AuthorizationStrategy::DEFAULT),
        ]);
        let update = JobUpdate::new().remove_shared(users.iter().cloned());
        if self.store.update(&filter, &update).await? != 1 {
            return Err(not_found());
        }
        tracing::info!(job_id = %id, user, count = users.len(), "job unshared");
        Ok(())
    }

    pub async fn get_job(&self, user: &str, job_id: &str, authorizer: &Authorizer) -> JobStateResult<Job> {
        check_string(user, "user", Some(MAX_LEN_USER))?;
        let id = JobId::parse(job_id)?;
        let not_found = || {
            JobStateError::NoSuchJob(format!(
                "There is no job {job_id} viewable by user {user}"
            ))
        };

        let job = match self.store.find_one(&JobFilter::Id(id)).await? {
            Some(record) => Job::from(record),
            None => return Err(not_found()),
        };
        authorizer
            .authorize_read(user, &job)
            .await
            .map_err(|e| masked(e, not_found))?;
        Ok(job)
    }

    pub async fn list_jobs(&self, query: &ListJobs, authorizer: &Authorizer) -> JobStateResult<Vec<Job>> {
        check_string(&query.user, "user", Some(MAX_LEN_USER))?;
        authorizer
            .authorize_read_params(&query.strategy, &query.user, &query.auth_params)
            .await?;

        let mut clauses = Vec::new();
        if query.strategy.is_default() {
            let owned = JobFilter::Owner(query.user.clone());
            if query.facets.shared || query.facets.is_empty() {
                clauses.push(JobFilter::or([
                    owned,
                    JobFilter::SharedWith(query.user.clone()),
                ]));
            } else {
                clauses.push(owned);
            }
        } else {
            clauses.push(JobFilter::AuthStrategy(query.strategy.clone()));
            clauses.push(JobFilter::AuthParamIn(query.auth_params.clone()));
        }
        if !query.services.is_empty() {
            for s in &query.services {
                check_string(s, "service", Some(MAX_LEN_SERVICE))?;
            }
            clauses.push(JobFilter::ServiceIn(query.services.clone()));
        }
        if let Some(stages) = query.facets.stage_filter() {
            clauses.push(stages);
        }

        let jobs: Vec<Job> = self
            .store
            .find(&JobFilter::And(clauses))
            .await?
            .into_iter()
            .map(Job::from)
            .collect();
        tracing::debug!(user = %query.user, strategy = %query.strategy, count = jobs.len(), "jobs listed");
        Ok(jobs)
    }

    /// Services that have started jobs owned by or shared with `user`.
    pub async fn list_services(&self, user: &str) -> JobStateResult<BTreeSet<String>> {
        check_string(user, "user", Some(MAX_LEN_USER))?;
        let filter = JobFilter::and([
            JobFilter::or([
                JobFilter::Owner(user.to_string()),
                JobFilter::SharedWith(user.to_string()),
            ]),
            JobFilter::ServiceSet,
        ]);
        Ok(self.store.distinct_services(&filter).await?)
    }
}

fn started_job_filter(user: &str, job_id: &str, service: &str) -> JobStateResult<JobFilter> {
    check_string(user, "user", Some(MAX_LEN_USER))?;
    let id = JobId::parse(job_id)?;
    check_string(service, "service", Some(MAX_LEN_SERVICE))?;
    Ok(JobFilter::and([
        JobFilter::Id(id),
        JobFilter::Owner(user.to_string()),
        JobFilter::Service(service.to_string()),
        JobFilter::Complete(false),
    ]))
}

fn not_uncompleted(job_id: &str, user: &str, service: &str) -> JobStateError {
    JobStateError::NoSuchJob(format!(
        "There is no uncompleted job {job_id} for user {user} started by service {service}"
    ))
}

fn non_default(job_id: &str, strategy: &AuthorizationStrategy) -> JobStateError {
    JobStateError::NonDefaultStrategy(format!(
        "Job {job_id} uses the {strategy} authorization strategy; only jobs with default authorization can be shared"
    ))
}

fn check_est_complete(est: Option<DateTime<Utc>>, now: DateTime<Utc>) -> JobStateResult<()> {
    match est {
        Some(t) if t <= now => Err(JobStateError::InvalidInput(
            "The estimated completion date must be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_share_params(user: &str, job_id: &str, users: &[String], user_kind: &str) -> JobStateResult<JobId> {
    check_string(user, user_kind, None)?;
    if users.is_empty() {
        return Err(JobStateError::InvalidInput("The users list is empty".to_string()));
    }
    for u in users {
        check_string(u, "user", None)?;
    }
    Ok(JobId::parse(job_id)?)
}

/// Denials read as a missing job; every other authorization failure keeps
/// its own kind.
fn masked(err: AuthzError, not_found: impl FnOnce() -> JobStateError) -> JobStateError {
    match err {
        AuthzError::Denied(_) => not_found(),
        other => JobStateError::from(other),
    }
}
