//! Storage for schema version records.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::jobs::StoreError;

/// One schema version record. Serde names match the persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    #[serde(rename = "config")]
    pub schema_type: String,
    #[serde(rename = "schemaver")]
    pub version: u32,
    #[serde(rename = "inupdate")]
    pub in_update: bool,
}

impl SchemaRecord {
    pub fn new(schema_type: impl Into<String>, version: u32, in_update: bool) -> Self {
        Self {
            schema_type: schema_type.into(),
            version,
            in_update,
        }
    }
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Enforce at most one record per schema type.
    async fn ensure_unique_index(&self) -> Result<(), StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] if a record for the type exists.
    async fn insert(&self, record: &SchemaRecord) -> Result<(), StoreError>;

    async fn find(&self, schema_type: &str) -> Result<Vec<SchemaRecord>, StoreError>;

    /// Overwrite version and flag only if the stored record still holds
    /// `expected`. Returns the number of records changed.
    async fn update(
        &self,
        expected: &SchemaRecord,
        version: u32,
        in_update: bool,
    ) -> Result<u64, StoreError>;

    /// Unconditionally write the record, creating it if absent.
    async fn replace(&self, record: &SchemaRecord) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: SchemaStore + ?Sized> SchemaStore for Arc<S> {
    async fn ensure_unique_index(&self) -> Result<(), StoreError> {
        (**self).ensure_unique_index().await
    }

    async fn insert(&self, record: &SchemaRecord) -> Result<(), StoreError> {
        (**self).insert(record).await
    }

    async fn find(&self, schema_type: &str) -> Result<Vec<SchemaRecord>, StoreError> {
        (**self).find(schema_type).await
    }

    async fn update(
        &self,
        expected: &SchemaRecord,
        version: u32,
        in_update: bool,
    ) -> Result<u64, StoreError> {
        (**self).update(expected, version, in_update).await
    }

    async fn replace(&self, record: &SchemaRecord) -> Result<(), StoreError> {
        (**self).replace(record).await
    }
}

/// In-memory schema store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    records: RwLock<Vec<SchemaRecord>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as-is, duplicates included. Used to reproduce corrupt
    /// databases.
    pub fn with_records(records: Vec<SchemaRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn records(&self) -> Vec<SchemaRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn ensure_unique_index(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, record: &SchemaRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.iter().any(|r| r.schema_type == record.schema_type) {
            return Err(StoreError::DuplicateKey(record.schema_type.clone()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find(&self, schema_type: &str) -> Result<Vec<SchemaRecord>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .filter(|r| r.schema_type == schema_type)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        expected: &SchemaRecord,
        version: u32,
        in_update: bool,
    ) -> Result<u64, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let mut changed = 0;
        for r in records.iter_mut().filter(|r| **r == *expected) {
            r.version = version;
            r.in_update = in_update;
            changed += 1;
        }
        Ok(changed)
    }

    async fn replace(&self, record: &SchemaRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.retain(|r| r.schema_type != record.schema_type);
        records.push(record.clone());
        Ok(())
    }
}
