//! `jobstate-core` — job lifecycle domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the persisted job record, its derived view, and boundary validation.

pub mod error;
pub mod id;
pub mod job;
pub mod metadata;
pub mod progress;
pub mod strategy;
pub mod validate;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{Job, JobRecord, JobResult, JobResults, JobStage};
pub use metadata::{JobMetadata, MetaPair};
pub use progress::{ProgressSpec, ProgressType};
pub use strategy::{AuthorizationStrategy, DEFAULT_AUTH_PARAM};
