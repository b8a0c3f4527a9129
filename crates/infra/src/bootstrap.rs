//! Wiring for a Postgres-backed deployment.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use jobstate_auth::{AuthorityError, WorkspaceAuthorizationFactory};

use crate::config::JobStateConfig;
use crate::jobs::{JobState, JobStateError, PostgresJobStore};
use crate::pg::map_sqlx_error;
use crate::schema::{PostgresSchemaStore, SchemaError, SchemaManager};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to connect to the database: {0}")]
    Database(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Jobs(#[from] JobStateError),
    #[error("workspace service unavailable: {0}")]
    Workspace(#[from] AuthorityError),
}

/// A ready engine plus the collaborators callers need alongside it.
#[derive(Debug)]
pub struct JobStateServices {
    pub jobs: JobState<PostgresJobStore>,
    pub schema: SchemaManager,
    /// Set when a workspace service URL is configured.
    pub workspace: Option<WorkspaceAuthorizationFactory>,
}

pub async fn connect_pool(config: &JobStateConfig) -> Result<PgPool, BootstrapError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| BootstrapError::Database(map_sqlx_error("connect", e).to_string()))
}

pub async fn open_schema_manager(pool: &PgPool) -> Result<SchemaManager, BootstrapError> {
    Ok(SchemaManager::new(PostgresSchemaStore::new(pool.clone())).await?)
}

/// Connect, ensure tables and indexes, pass the schema gate and, if
/// configured, confirm the workspace service answers.
pub async fn open_postgres(config: &JobStateConfig) -> Result<JobStateServices, BootstrapError> {
    let pool = connect_pool(config).await?;
    let schema = open_schema_manager(&pool).await?;
    let jobs = JobState::new(PostgresJobStore::new(pool), &schema).await?;

    let workspace = match &config.workspace {
        Some(ws) => Some(WorkspaceAuthorizationFactory::connect(ws.url.clone(), ws.allow_insecure).await?),
        None => None,
    };

    tracing::info!(
        max_connections = config.max_connections,
        workspace = workspace.is_some(),
        "job state service ready"
    );
    Ok(JobStateServices {
        jobs,
        schema,
        workspace,
    })
}
