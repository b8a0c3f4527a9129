//! Infrastructure layer: document stores, schema gate, job engine, config.

pub mod bootstrap;
pub mod config;
pub mod jobs;
pub mod schema;

mod pg;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, JobStateConfig};
pub use jobs::{JobState, JobStateError, JobStore};
pub use schema::{SchemaError, SchemaManager};
