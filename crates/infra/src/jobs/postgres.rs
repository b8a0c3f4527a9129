//! Postgres-backed job store.
//!
//! One `jobs` table whose column names are the persisted document field
//! names. `meta` and `results` are `jsonb` in their historical shapes and
//! `shared` is a `text[]`. Filters compile to a single `WHERE` clause, so
//! every conditional update is one `UPDATE` statement and is atomic.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use jobstate_core::{AuthorizationStrategy, JobId, JobRecord, JobResults, MetaPair, ProgressType};

use super::filter::{FieldValue, JobFilter, JobUpdate};
use super::store::{JobStore, StoreError};
use crate::pg::{decode_error, map_sqlx_error};

const JOB_COLUMNS: &str = r#""_id", "user", "service", "desc", "progtype", "prog", "maxprog",
    "status", "created", "started", "updated", "estcompl", "complete", "error", "errormsg",
    "results", "shared", "authstrat", "authparam", "meta", "canceledby""#;

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        "_id" UUID PRIMARY KEY,
        "user" TEXT NOT NULL,
        "service" TEXT,
        "desc" TEXT,
        "progtype" TEXT,
        "prog" BIGINT,
        "maxprog" BIGINT,
        "status" TEXT,
        "created" TIMESTAMPTZ NOT NULL,
        "started" TIMESTAMPTZ,
        "updated" TIMESTAMPTZ NOT NULL,
        "estcompl" TIMESTAMPTZ,
        "complete" BOOLEAN,
        "error" BOOLEAN,
        "errormsg" TEXT,
        "results" JSONB,
        "shared" TEXT[] NOT NULL DEFAULT '{}',
        "authstrat" TEXT NOT NULL,
        "authparam" TEXT NOT NULL,
        "meta" JSONB NOT NULL DEFAULT '[]'::jsonb,
        "canceledby" TEXT
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS jobs_user_service_complete ON jobs ("user", "service", "complete")"#,
    r#"CREATE INDEX IF NOT EXISTS jobs_shared ON jobs USING GIN ("shared")"#,
    // Shared-visibility listings filter on these after the GIN lookup.
    r#"CREATE INDEX IF NOT EXISTS jobs_service_complete ON jobs ("service", "complete")"#,
    r#"CREATE INDEX IF NOT EXISTS jobs_authstrat_authparam ON jobs ("authstrat", "authparam")"#,
];

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self), err)]
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(*statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_indexes", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, record), fields(job_id = %record.id, user = %record.user), err)]
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        let results = results_json(&record.results)?;
        let meta = serde_json::to_value(&record.meta)
            .map_err(|e| StoreError::Storage(format!("failed to encode metadata: {e}")))?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO jobs ({JOB_COLUMNS}) "));
        qb.push_values(std::iter::once(record), |mut row, r| {
            row.push_bind(*r.id.as_uuid())
                .push_bind(r.user)
                .push_bind(r.service)
                .push_bind(r.description)
                .push_bind(r.progress_type.map(|p| p.as_str().to_string()))
                .push_bind(r.progress)
                .push_bind(r.max_progress)
                .push_bind(r.status)
                .push_bind(r.created)
                .push_bind(r.started)
                .push_bind(r.updated)
                .push_bind(r.est_complete)
                .push_bind(r.complete)
                .push_bind(r.error)
                .push_bind(r.error_message)
                .push_bind(results.clone())
                .push_bind(r.shared)
                .push_bind(r.auth_strategy.as_str().to_string())
                .push_bind(r.auth_param)
                .push_bind(meta.clone())
                .push_bind(r.canceled_by);
        });

        qb.build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE "));
        push_filter(&mut qb, filter);
        qb.push(r#" ORDER BY "created", "_id" LIMIT 1"#);

        let row = qb
            .build()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_one", e))?;
        row.map(|r| decode_job(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE "));
        push_filter(&mut qb, filter);
        qb.push(r#" ORDER BY "created", "_id""#);

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find", e))?;
        rows.iter().map(decode_job).collect()
    }

    #[instrument(skip(self), err)]
    async fn update(&self, filter: &JobFilter, update: &JobUpdate) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE jobs SET ");
        push_update(&mut qb, update)?;
        qb.push(" WHERE ");
        push_filter(&mut qb, filter);

        let result = qb
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM jobs WHERE ");
        push_filter(&mut qb, filter);

        let result = qb
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn distinct_services(&self, filter: &JobFilter) -> Result<BTreeSet<String>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"SELECT DISTINCT "service" FROM jobs WHERE "service" IS NOT NULL AND "#,
        );
        push_filter(&mut qb, filter);

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("distinct_services", e))?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("service").map_err(|e| decode_error("service", e)))
            .collect()
    }
}

fn results_json(results: &Option<JobResults>) -> Result<Option<serde_json::Value>, StoreError> {
    results
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Storage(format!("failed to encode results: {e}")))
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &JobFilter) {
    match filter {
        JobFilter::Id(id) => {
            qb.push(r#""_id" = "#).push_bind(*id.as_uuid());
        }
        JobFilter::Owner(user) => {
            qb.push(r#""user" = "#).push_bind(user.clone());
        }
        JobFilter::SharedWith(user) => {
            qb.push_bind(user.clone()).push(r#" = ANY("shared")"#);
        }
        JobFilter::ServiceUnset => {
            qb.push(r#""service" IS NULL"#);
        }
        JobFilter::ServiceSet => {
            qb.push(r#""service" IS NOT NULL"#);
        }
        JobFilter::Service(service) => {
            qb.push(r#""service" = "#).push_bind(service.clone());
        }
        JobFilter::ServiceIn(services) => {
            qb.push(r#""service" = ANY("#)
                .push_bind(services.clone())
                .push(")");
        }
        JobFilter::Complete(value) => {
            qb.push(r#""complete" = "#).push_bind(*value);
        }
        JobFilter::NotComplete => {
            qb.push(r#""complete" IS DISTINCT FROM TRUE"#);
        }
        JobFilter::Error(value) => {
            qb.push(r#""error" = "#).push_bind(*value);
        }
        JobFilter::Canceled(true) => {
            qb.push(r#""canceledby" IS NOT NULL"#);
        }
        JobFilter::Canceled(false) => {
            qb.push(r#""canceledby" IS NULL"#);
        }
        JobFilter::AuthStrategy(strategy) => {
            qb.push(r#""authstrat" = "#)
                .push_bind(strategy.as_str().to_string());
        }
        JobFilter::AuthParamIn(params) => {
            qb.push(r#""authparam" = ANY("#)
                .push_bind(params.clone())
                .push(")");
        }
        JobFilter::And(filters) => push_group(qb, filters, " AND ", "TRUE"),
        JobFilter::Or(filters) => push_group(qb, filters, " OR ", "FALSE"),
    }
}

fn push_group(
    qb: &mut QueryBuilder<'_, Postgres>,
    filters: &[JobFilter],
    separator: &str,
    empty: &str,
) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (idx, f) in filters.iter().enumerate() {
        if idx > 0 {
            qb.push(separator);
        }
        push_filter(qb, f);
    }
    qb.push(")");
}

fn push_update(qb: &mut QueryBuilder<'_, Postgres>, update: &JobUpdate) -> Result<(), StoreError> {
    if update.is_empty() {
        qb.push(r#""_id" = "_id""#);
        return Ok(());
    }

    let mut first = true;

    for value in update.assignments() {
        comma(qb, &mut first);
        qb.push(format!(r#""{}" = "#, value.field()));
        match value {
            FieldValue::Service(v) | FieldValue::CanceledBy(v) => {
                qb.push_bind(v.clone());
            }
            FieldValue::Status(v) | FieldValue::Description(v) | FieldValue::ErrorMessage(v) => {
                qb.push_bind(v.clone());
            }
            FieldValue::ProgressType(v) => {
                qb.push_bind(v.as_str().to_string());
            }
            FieldValue::Progress(v) => {
                qb.push_bind(*v);
            }
            FieldValue::MaxProgress(v) => {
                qb.push_bind(*v);
            }
            FieldValue::Started(v) | FieldValue::Updated(v) => {
                qb.push_bind(*v);
            }
            FieldValue::EstComplete(v) => {
                qb.push_bind(*v);
            }
            FieldValue::Complete(v) | FieldValue::Error(v) => {
                qb.push_bind(*v);
            }
            FieldValue::Results(v) => {
                qb.push_bind(results_json(v)?);
            }
        }
    }

    if let Some(delta) = update.progress_increment() {
        comma(qb, &mut first);
        qb.push(r#""prog" = COALESCE("prog", 0) + "#).push_bind(delta);
    }

    let additions = update.shared_additions();
    let removals = update.shared_removals();
    if !additions.is_empty() || !removals.is_empty() {
        comma(qb, &mut first);
        qb.push(r#""shared" = "#);
        // Removal wraps the addition so both can apply in one assignment.
        if !removals.is_empty() {
            qb.push("ARRAY(SELECT u FROM unnest(");
        }
        if additions.is_empty() {
            qb.push(r#""shared""#);
        } else {
            qb.push(r#"("shared" || ARRAY(SELECT u FROM unnest("#)
                .push_bind(additions.to_vec())
                .push(r#"::text[]) WITH ORDINALITY AS a(u, i) WHERE NOT (u = ANY("shared")) ORDER BY i))"#);
        }
        if !removals.is_empty() {
            qb.push(") WITH ORDINALITY AS r(u, i) WHERE NOT (u = ANY(")
                .push_bind(removals.to_vec())
                .push("::text[])) ORDER BY i)");
        }
    }
    Ok(())
}

fn comma(qb: &mut QueryBuilder<'_, Postgres>, first: &mut bool) {
    if !*first {
        qb.push(", ");
    }
    *first = false;
}

#[derive(Debug)]
struct JobRow {
    id: uuid::Uuid,
    user: String,
    service: Option<String>,
    description: Option<String>,
    progress_type: Option<String>,
    progress: Option<i64>,
    max_progress: Option<i64>,
    status: Option<String>,
    created: DateTime<Utc>,
    started: Option<DateTime<Utc>>,
    updated: DateTime<Utc>,
    est_complete: Option<DateTime<Utc>>,
    complete: Option<bool>,
    error: Option<bool>,
    error_message: Option<String>,
    results: Option<serde_json::Value>,
    shared: Vec<String>,
    auth_strategy: String,
    auth_param: String,
    meta: serde_json::Value,
    canceled_by: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for JobRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("_id")?,
            user: row.try_get("user")?,
            service: row.try_get("service")?,
            description: row.try_get("desc")?,
            progress_type: row.try_get("progtype")?,
            progress: row.try_get("prog")?,
            max_progress: row.try_get("maxprog")?,
            status: row.try_get("status")?,
            created: row.try_get("created")?,
            started: row.try_get("started")?,
            updated: row.try_get("updated")?,
            est_complete: row.try_get("estcompl")?,
            complete: row.try_get("complete")?,
            error: row.try_get("error")?,
            error_message: row.try_get("errormsg")?,
            results: row.try_get("results")?,
            shared: row.try_get("shared")?,
            auth_strategy: row.try_get("authstrat")?,
            auth_param: row.try_get("authparam")?,
            meta: row.try_get("meta")?,
            canceled_by: row.try_get("canceledby")?,
        })
    }
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let progress_type = match row.progress_type {
            Some(p) => Some(
                ProgressType::parse(&p)
                    .ok_or_else(|| decode_error("job", format!("unknown progress type {p}")))?,
            ),
            None => None,
        };
        let results: Option<JobResults> = row
            .results
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| decode_error("job", e))?;
        let meta: Vec<MetaPair> =
            serde_json::from_value(row.meta).map_err(|e| decode_error("job", e))?;
        let auth_strategy =
            AuthorizationStrategy::new(row.auth_strategy).map_err(|e| decode_error("job", e))?;

        Ok(JobRecord {
            id: JobId::from_uuid(row.id),
            user: row.user,
            service: row.service,
            description: row.description,
            progress_type,
            progress: row.progress,
            max_progress: row.max_progress,
            status: row.status,
            created: row.created,
            started: row.started,
            updated: row.updated,
            est_complete: row.est_complete,
            complete: row.complete,
            error: row.error,
            error_message: row.error_message,
            results,
            shared: row.shared,
            auth_strategy,
            auth_param: row.auth_param,
            meta,
            canceled_by: row.canceled_by,
        })
    }
}

fn decode_job(row: &sqlx::postgres::PgRow) -> Result<JobRecord, StoreError> {
    use sqlx::FromRow;
    let row = JobRow::from_row(row).map_err(|e| decode_error("job", e))?;
    JobRecord::try_from(row)
}
