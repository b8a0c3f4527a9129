//! Schema version gate.
//!
//! Refuses to let a codebase operate on a database written by a newer
//! schema, or on one that is mid-migration. The first process to start
//! against an empty store records its version; concurrent first starts are
//! resolved by the store's unique key on the schema type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::store::{SchemaRecord, SchemaStore};
use crate::jobs::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Incompatible database schema. Server is v{codebase}, DB is v{database}")]
    Incompatible { codebase: u32, database: u32 },

    #[error("The database is in the middle of an update from version {version} of the schema.")]
    UpdateInProgress { version: u32 },

    /// Corrupt persisted state.
    #[error("{0}")]
    InvalidRecord(String),

    #[error("No upgrade path is registered for schema type {schema_type} from v{from} to v{to}")]
    NoUpgradePath {
        schema_type: String,
        from: u32,
        to: u32,
    },

    #[error("Schema upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("There was a problem communicating with the database: {0}")]
    Communication(#[from] StoreError),
}

/// Migrates persisted data between two schema versions.
///
/// No upgraders ship with this crate; registering one is the only way an
/// older database gets upgraded.
#[async_trait]
pub trait SchemaUpgrader: Send + Sync {
    async fn upgrade(&self, schema_type: &str, from: u32, to: u32) -> Result<(), SchemaError>;
}

pub struct SchemaManager {
    store: Arc<dyn SchemaStore>,
    upgraders: HashMap<String, Arc<dyn SchemaUpgrader>>,
}

impl SchemaManager {
    pub async fn new(store: impl SchemaStore + 'static) -> Result<Self, SchemaError> {
        Self::from_arc(Arc::new(store)).await
    }

    pub async fn from_arc(store: Arc<dyn SchemaStore>) -> Result<Self, SchemaError> {
        store.ensure_unique_index().await?;
        Ok(Self {
            store,
            upgraders: HashMap::new(),
        })
    }

    pub fn with_upgrader(
        mut self,
        schema_type: impl Into<String>,
        upgrader: impl SchemaUpgrader + 'static,
    ) -> Self {
        self.upgraders.insert(schema_type.into(), Arc::new(upgrader));
        self
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn check_and_upgrade(
        &self,
        schema_type: &str,
        codebase_version: u32,
    ) -> Result<(), SchemaError> {
        check_schema_type(schema_type)?;
        if codebase_version < 1 {
            return Err(SchemaError::InvalidInput(
                "codebaseVersion must be > 0".to_string(),
            ));
        }

        let initial = SchemaRecord::new(schema_type, codebase_version, false);
        match self.store.insert(&initial).await {
            Ok(()) => {
                tracing::info!(schema_type, version = codebase_version, "recorded initial schema version");
                return Ok(());
            }
            // Not the first start, or lost the race to another first start.
            Err(StoreError::DuplicateKey(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let stored = self.single_record(schema_type).await?;
        if stored.version > codebase_version {
            return Err(SchemaError::Incompatible {
                codebase: codebase_version,
                database: stored.version,
            });
        }
        if stored.in_update {
            return Err(SchemaError::UpdateInProgress {
                version: stored.version,
            });
        }
        if stored.version == codebase_version {
            return Ok(());
        }
        self.upgrade(stored, codebase_version).await
    }

    async fn upgrade(&self, stored: SchemaRecord, to: u32) -> Result<(), SchemaError> {
        let from = stored.version;
        let schema_type = stored.schema_type.clone();
        let upgrader = self.upgraders.get(&schema_type).ok_or_else(|| {
            SchemaError::NoUpgradePath {
                schema_type: schema_type.clone(),
                from,
                to,
            }
        })?;

        // Claim the record; losing means another process started migrating.
        if self.store.update(&stored, from, true).await? != 1 {
            return Err(SchemaError::UpdateInProgress { version: from });
        }
        tracing::warn!(schema_type = %schema_type, from, to, "upgrading database schema");

        if let Err(e) = upgrader.upgrade(&schema_type, from, to).await {
            tracing::error!(schema_type = %schema_type, from, to, error = %e, "schema upgrade failed; record left in update");
            return Err(SchemaError::UpgradeFailed(e.to_string()));
        }

        let claimed = SchemaRecord::new(schema_type.clone(), from, true);
        if self.store.update(&claimed, to, false).await? != 1 {
            return Err(SchemaError::InvalidRecord(format!(
                "The schema record for {schema_type} changed during the upgrade from v{from} to v{to}"
            )));
        }
        tracing::info!(schema_type = %schema_type, version = to, "database schema upgraded");
        Ok(())
    }

    async fn single_record(&self, schema_type: &str) -> Result<SchemaRecord, SchemaError> {
        let mut records = self.store.find(schema_type).await?;
        match records.len() {
            1 => Ok(records.remove(0)),
            0 => Err(SchemaError::InvalidRecord(format!(
                "No schema document found in the database for schema type {schema_type}"
            ))),
            _ => Err(SchemaError::InvalidRecord(format!(
                "Multiple schema documents found in the database for schema type {schema_type}. \
                 This should not happen, something is very wrong."
            ))),
        }
    }

    /// Stored version, or `None` before the first start.
    pub async fn get_version(&self, schema_type: &str) -> Result<Option<u32>, SchemaError> {
        Ok(self.get_record(schema_type).await?.map(|r| r.version))
    }

    pub async fn in_update(&self, schema_type: &str) -> Result<Option<bool>, SchemaError> {
        Ok(self.get_record(schema_type).await?.map(|r| r.in_update))
    }

    pub async fn get_record(&self, schema_type: &str) -> Result<Option<SchemaRecord>, SchemaError> {
        check_schema_type(schema_type)?;
        if self.store.find(schema_type).await?.is_empty() {
            return Ok(None);
        }
        self.single_record(schema_type).await.map(Some)
    }

    /// Overwrite the record. Maintenance only.
    pub async fn set_record(
        &self,
        schema_type: &str,
        version: u32,
        in_update: bool,
    ) -> Result<(), SchemaError> {
        check_schema_type(schema_type)?;
        if version < 1 {
            return Err(SchemaError::InvalidInput("version must be > 0".to_string()));
        }
        self.store
            .replace(&SchemaRecord::new(schema_type, version, in_update))
            .await?;
        tracing::warn!(schema_type, version, in_update, "schema record overwritten");
        Ok(())
    }
}

impl core::fmt::Debug for SchemaManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchemaManager")
            .field("upgraders", &self.upgraders.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn check_schema_type(schema_type: &str) -> Result<(), SchemaError> {
    if schema_type.is_empty() {
        return Err(SchemaError::InvalidInput(
            "schemaType can't be null or empty".to_string(),
        ));
    }
    Ok(())
}
