//! Schema version gate and its record storage.

pub mod manager;
pub mod postgres;
pub mod store;

pub use manager::{SchemaError, SchemaManager, SchemaUpgrader};
pub use postgres::PostgresSchemaStore;
pub use store::{InMemorySchemaStore, SchemaRecord, SchemaStore};
