//! Job lifecycle: document store seam, backends and the engine.
//!
//! ## Components
//!
//! - `JobFilter` / `JobUpdate`: typed conditional-update vocabulary
//! - `JobStore`: persistence for job documents (in-memory or Postgres)
//! - `JobState`: the lifecycle engine enforcing created → started →
//!   complete/error/canceled through conditional updates

pub mod engine;
pub mod error;
pub mod filter;
pub mod postgres;
pub mod store;

pub use engine::{
    CompleteJob, CreateAndStartJob, JobFacets, JobState, ListJobs, SCHEMA_TYPE, SCHEMA_VERSION,
    StartJob, UpdateJob,
};
pub use error::{JobStateError, JobStateResult};
pub use filter::{FieldValue, JobFilter, JobUpdate};
pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStore, StoreError};
