use thiserror::Error;

use jobstate_auth::AuthzError;
use jobstate_core::DomainError;

use super::store::StoreError;
use crate::schema::SchemaError;

/// Error returned by every job engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStateError {
    #[error("{0}")]
    InvalidInput(String),

    /// The job does not exist, is not visible to the caller, or is not in
    /// the state the operation requires. The message names which.
    #[error("{0}")]
    NoSuchJob(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    UnimplementedStrategy(String),

    /// Sharing was attempted on a job under a non-default strategy.
    #[error("{0}")]
    NonDefaultStrategy(String),

    /// Authorization failures that must not be reported as a missing job.
    #[error(transparent)]
    Authorization(AuthzError),

    #[error("There was a problem communicating with the database: {0}")]
    Communication(StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl From<DomainError> for JobStateError {
    fn from(err: DomainError) -> Self {
        JobStateError::InvalidInput(err.message().to_string())
    }
}

impl From<StoreError> for JobStateError {
    fn from(err: StoreError) -> Self {
        JobStateError::Communication(err)
    }
}

impl From<AuthzError> for JobStateError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::InvalidInput(msg) => JobStateError::InvalidInput(msg),
            AuthzError::Denied(msg) => JobStateError::Unauthorized(msg),
            AuthzError::Unimplemented(strategy) => JobStateError::UnimplementedStrategy(format!(
                "Authorization strategy {strategy} is not supported"
            )),
            other => JobStateError::Authorization(other),
        }
    }
}

pub type JobStateResult<T> = Result<T, JobStateError>;
