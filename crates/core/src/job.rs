//! Job record and its derived, read-only view.
//!
//! [`JobRecord`] is the persisted document; its serde names are a
//! compatibility contract with existing data and must not change.
//! [`Job`] wraps a record and computes the exposed fields (stage, clamped
//! progress, metadata map) at read time. Nothing derived is ever stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::metadata::{JobMetadata, MetaPair};
use crate::progress::ProgressType;
use crate::strategy::AuthorizationStrategy;

/// Derived lifecycle stage of a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Created,
    Started,
    Complete,
    Error,
    Canceled,
}

impl JobStage {
    /// Compute the stage from the stored fields it depends on.
    ///
    /// Checked in order: canceler set, service unset, not complete, no error.
    pub fn derive(canceled: bool, has_service: bool, complete: bool, error: bool) -> Self {
        if canceled {
            JobStage::Canceled
        } else if !has_service {
            JobStage::Created
        } else if !complete {
            JobStage::Started
        } else if !error {
            JobStage::Complete
        } else {
            JobStage::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Created => "created",
            JobStage::Started => "started",
            JobStage::Complete => "complete",
            JobStage::Error => "error",
            JobStage::Canceled => "canceled",
        }
    }
}

impl core::fmt::Display for JobStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result location reported by a service on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(rename = "servtype")]
    pub service_type: Option<String>,
    pub url: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
}

/// Results payload supplied on completion. Opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResults {
    #[serde(rename = "shocknodes")]
    pub shock_nodes: Option<Vec<String>>,
    #[serde(rename = "shockurl")]
    pub shock_url: Option<String>,
    #[serde(rename = "workspaceids")]
    pub workspace_ids: Option<Vec<String>>,
    #[serde(rename = "workspaceurl")]
    pub workspace_url: Option<String>,
    pub results: Option<Vec<JobResult>>,
}

/// Persisted job document.
///
/// Fields unset before a job is started (`service`, `complete`, `error`, ...)
/// are `None`, which the store's filters distinguish from `Some(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "_id")]
    pub id: JobId,
    pub user: String,
    pub service: Option<String>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
    #[serde(rename = "progtype")]
    pub progress_type: Option<ProgressType>,
    #[serde(rename = "prog")]
    pub progress: Option<i64>,
    #[serde(rename = "maxprog")]
    pub max_progress: Option<i64>,
    pub status: Option<String>,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub updated: DateTime<Utc>,
    #[serde(rename = "estcompl")]
    pub est_complete: Option<DateTime<Utc>>,
    pub complete: Option<bool>,
    pub error: Option<bool>,
    #[serde(rename = "errormsg")]
    pub error_message: Option<String>,
    pub results: Option<JobResults>,
    #[serde(default)]
    pub shared: Vec<String>,
    #[serde(rename = "authstrat")]
    pub auth_strategy: AuthorizationStrategy,
    #[serde(rename = "authparam")]
    pub auth_param: String,
    #[serde(default)]
    pub meta: Vec<MetaPair>,
    #[serde(rename = "canceledby", default, skip_serializing_if = "Option::is_none")]
    pub canceled_by: Option<String>,
}

impl JobRecord {
    /// A freshly created, unstarted job.
    pub fn unstarted(
        id: JobId,
        user: impl Into<String>,
        auth_strategy: AuthorizationStrategy,
        auth_param: impl Into<String>,
        metadata: &JobMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user: user.into(),
            service: None,
            description: None,
            progress_type: None,
            progress: None,
            max_progress: None,
            status: None,
            created: now,
            started: None,
            updated: now,
            est_complete: None,
            complete: None,
            error: None,
            error_message: None,
            results: None,
            shared: Vec::new(),
            auth_strategy,
            auth_param: auth_param.into(),
            meta: metadata.to_pairs(),
            canceled_by: None,
        }
    }
}

/// Read-only view of a job with derived fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    record: JobRecord,
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Self { record }
    }
}

impl Job {
    pub fn id(&self) -> JobId {
        self.record.id
    }

    /// The user that created (and owns) the job.
    pub fn owner(&self) -> &str {
        &self.record.user
    }

    /// The reporting service, set when the job is started.
    pub fn service(&self) -> Option<&str> {
        self.record.service.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.record.description.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.record.status.as_deref()
    }

    pub fn progress_type(&self) -> Option<ProgressType> {
        self.record.progress_type
    }

    /// Maximum progress, absent when progress is not reported.
    pub fn max_progress(&self) -> Option<u64> {
        match self.record.progress_type {
            None | Some(ProgressType::None) => None,
            Some(_) => self.record.max_progress.map(clamp_non_negative),
        }
    }

    /// Current progress, clamped to the maximum and pinned to it once the
    /// job is complete. Absent when progress is not reported.
    pub fn progress(&self) -> Option<u64> {
        let max = self.max_progress()?;
        let prog = clamp_non_negative(self.record.progress.unwrap_or(0));
        if self.is_complete() || prog > max {
            Some(max)
        } else {
            Some(prog)
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.record.created
    }

    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.record.started
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.record.updated
    }

    pub fn est_complete(&self) -> Option<DateTime<Utc>> {
        self.record.est_complete
    }

    pub fn is_complete(&self) -> bool {
        self.record.complete.unwrap_or(false)
    }

    pub fn has_error(&self) -> bool {
        self.record.error.unwrap_or(false)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.record.error_message.as_deref()
    }

    pub fn is_canceled(&self) -> bool {
        self.record.canceled_by.is_some()
    }

    pub fn canceled_by(&self) -> Option<&str> {
        self.record.canceled_by.as_deref()
    }

    pub fn results(&self) -> Option<&JobResults> {
        self.record.results.as_ref()
    }

    /// Users the job is shared with. Always empty for non-default strategies.
    pub fn shared(&self) -> &[String] {
        if self.record.auth_strategy.is_default() {
            &self.record.shared
        } else {
            &[]
        }
    }

    pub fn is_shared_with(&self, user: &str) -> bool {
        self.shared().iter().any(|u| u == user)
    }

    pub fn auth_strategy(&self) -> &AuthorizationStrategy {
        &self.record.auth_strategy
    }

    pub fn auth_param(&self) -> &str {
        &self.record.auth_param
    }

    pub fn metadata(&self) -> JobMetadata {
        JobMetadata::from_pairs(&self.record.meta)
    }

    pub fn stage(&self) -> JobStage {
        JobStage::derive(
            self.is_canceled(),
            self.record.service.is_some(),
            self.is_complete(),
            self.has_error(),
        )
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub fn into_record(self) -> JobRecord {
        self.record
    }
}

fn clamp_non_negative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}
