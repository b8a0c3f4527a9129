//! Postgres-backed schema version records (`schema_versions`).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::store::{SchemaRecord, SchemaStore};
use crate::jobs::StoreError;
use crate::pg::{decode_error, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresSchemaStore {
    pool: Arc<PgPool>,
}

impl PostgresSchemaStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn to_db_version(version: u32) -> Result<i32, StoreError> {
    i32::try_from(version)
        .map_err(|_| StoreError::Storage(format!("schema version {version} out of range")))
}

#[async_trait]
impl SchemaStore for PostgresSchemaStore {
    #[instrument(skip(self), err)]
    async fn ensure_unique_index(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                "config" TEXT NOT NULL,
                "schemaver" INTEGER NOT NULL,
                "inupdate" BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_unique_index", e))?;

        sqlx::query(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS schema_versions_config ON schema_versions ("config")"#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_unique_index", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(schema_type = %record.schema_type), err)]
    async fn insert(&self, record: &SchemaRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO schema_versions ("config", "schemaver", "inupdate")
            VALUES ($1, $2, $3)
            ON CONFLICT ("config") DO NOTHING
            "#,
        )
        .bind(&record.schema_type)
        .bind(to_db_version(record.version)?)
        .bind(record.in_update)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateKey(record.schema_type.clone()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find(&self, schema_type: &str) -> Result<Vec<SchemaRecord>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT "config", "schemaver", "inupdate" FROM schema_versions WHERE "config" = $1"#,
        )
        .bind(schema_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?;

        rows.iter()
            .map(|row| -> Result<SchemaRecord, StoreError> {
                let version: i32 = row.try_get("schemaver").map_err(|e| decode_error("schema", e))?;
                Ok(SchemaRecord {
                    schema_type: row.try_get("config").map_err(|e| decode_error("schema", e))?,
                    version: u32::try_from(version)
                        .map_err(|e| decode_error("schema", e))?,
                    in_update: row.try_get("inupdate").map_err(|e| decode_error("schema", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(schema_type = %expected.schema_type), err)]
    async fn update(
        &self,
        expected: &SchemaRecord,
        version: u32,
        in_update: bool,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE schema_versions SET "schemaver" = $1, "inupdate" = $2
            WHERE "config" = $3 AND "schemaver" = $4 AND "inupdate" = $5
            "#,
        )
        .bind(to_db_version(version)?)
        .bind(in_update)
        .bind(&expected.schema_type)
        .bind(to_db_version(expected.version)?)
        .bind(expected.in_update)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(schema_type = %record.schema_type), err)]
    async fn replace(&self, record: &SchemaRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO schema_versions ("config", "schemaver", "inupdate")
            VALUES ($1, $2, $3)
            ON CONFLICT ("config") DO UPDATE
            SET "schemaver" = EXCLUDED."schemaver", "inupdate" = EXCLUDED."inupdate"
            "#,
        )
        .bind(&record.schema_type)
        .bind(to_db_version(record.version)?)
        .bind(record.in_update)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("replace", e))?;
        Ok(())
    }
}
