use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use jobstate_core::{AuthorizationStrategy, Job};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Malformed arguments to an authorization check.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Denied(String),

    /// A non-default strategy reached an authorizer that does not implement it.
    #[error("authorization strategy {0} is not supported by this authorizer")]
    Unimplemented(String),

    /// The external permission authority could not be consulted.
    #[error("{0}")]
    Authority(String),

    #[error(
        "the user name {supplied} does not match the identity {bound} this authorizer was built for"
    )]
    IdentityMismatch { bound: String, supplied: String },
}

impl AuthzError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::Denied(msg.into())
    }
}

/// Hooks for jobs governed by a non-default strategy.
///
/// [`Authorizer`] validates arguments and applies the default ACL policy
/// itself; these hooks only ever see strategies other than
/// [`AuthorizationStrategy::DEFAULT`].
#[async_trait]
pub trait ExternalAuthorization: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn authorize_create(
        &self,
        strategy: &AuthorizationStrategy,
        auth_param: &str,
    ) -> Result<(), AuthzError>;

    async fn authorize_read(&self, user: &str, job: &Job) -> Result<(), AuthzError>;

    async fn authorize_read_params(
        &self,
        strategy: &AuthorizationStrategy,
        user: &str,
        auth_params: &[String],
    ) -> Result<(), AuthzError>;

    async fn authorize_cancel(&self, user: &str, job: &Job) -> Result<(), AuthzError>;

    async fn authorize_delete(&self, user: &str, job: &Job) -> Result<(), AuthzError>;
}

/// Supports only the default strategy; every hook is unimplemented.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalAuthorization;

#[async_trait]
impl ExternalAuthorization for NoExternalAuthorization {
    fn name(&self) -> &str {
        "default"
    }

    async fn authorize_create(
        &self,
        strategy: &AuthorizationStrategy,
        _auth_param: &str,
    ) -> Result<(), AuthzError> {
        Err(AuthzError::Unimplemented(strategy.to_string()))
    }

    async fn authorize_read(&self, _user: &str, job: &Job) -> Result<(), AuthzError> {
        Err(AuthzError::Unimplemented(job.auth_strategy().to_string()))
    }

    async fn authorize_read_params(
        &self,
        strategy: &AuthorizationStrategy,
        _user: &str,
        _auth_params: &[String],
    ) -> Result<(), AuthzError> {
        Err(AuthzError::Unimplemented(strategy.to_string()))
    }

    async fn authorize_cancel(&self, _user: &str, job: &Job) -> Result<(), AuthzError> {
        Err(AuthzError::Unimplemented(job.auth_strategy().to_string()))
    }

    async fn authorize_delete(&self, _user: &str, job: &Job) -> Result<(), AuthzError> {
        Err(AuthzError::Unimplemented(job.auth_strategy().to_string()))
    }
}

/// Authorization dispatcher handed to every engine operation that needs one.
///
/// Each check validates its arguments, decides jobs under the default
/// strategy with the built-in ACL policy (owner plus share list), and
/// forwards everything else to the configured [`ExternalAuthorization`].
#[derive(Clone)]
pub struct Authorizer {
    external: Arc<dyn ExternalAuthorization>,
}

impl Authorizer {
    pub fn new(external: impl ExternalAuthorization + 'static) -> Self {
        Self {
            external: Arc::new(external),
        }
    }

    pub fn from_arc(external: Arc<dyn ExternalAuthorization>) -> Self {
        Self { external }
    }

    /// An authorizer that knows only the default strategy.
    pub fn default_only() -> Self {
        Self::new(NoExternalAuthorization)
    }

    pub fn name(&self) -> &str {
        self.external.name()
    }

    pub async fn authorize_create(
        &self,
        strategy: &AuthorizationStrategy,
        auth_param: &str,
    ) -> Result<(), AuthzError> {
        if auth_param.is_empty() {
            return Err(AuthzError::invalid_input("authParam cannot be null or empty"));
        }
        if strategy.is_default() {
            return Ok(());
        }
        tracing::debug!(authorizer = self.name(), %strategy, auth_param, "delegating create check");
        self.external.authorize_create(strategy, auth_param).await
    }

    pub async fn authorize_read(&self, user: &str, job: &Job) -> Result<(), AuthzError> {
        check_user(user)?;
        if job.auth_strategy().is_default() {
            return if job.owner() == user || job.is_shared_with(user) {
                Ok(())
            } else {
                Err(AuthzError::denied(format!(
                    "Job {} is not viewable by user {}",
                    job.id(),
                    user
                )))
            };
        }
        tracing::debug!(authorizer = self.name(), job_id = %job.id(), user, "delegating read check");
        self.external.authorize_read(user, job).await
    }

    /// Check a listing request. Under the default strategy the listing
    /// filter itself restricts results to what the user may see.
    pub async fn authorize_read_params(
        &self,
        strategy: &AuthorizationStrategy,
        user: &str,
        auth_params: &[String],
    ) -> Result<(), AuthzError> {
        check_user(user)?;
        if auth_params.is_empty() {
            return Err(AuthzError::invalid_input("authParams cannot be null or empty"));
        }
        if auth_params.iter().any(|p| p.is_empty()) {
            return Err(AuthzError::invalid_input("authParam cannot be null or empty"));
        }
        if strategy.is_default() {
            return Ok(());
        }
        tracing::debug!(
            authorizer = self.name(),
            %strategy,
            user,
            count = auth_params.len(),
            "delegating listing check"
        );
        self.external
            .authorize_read_params(strategy, user, auth_params)
            .await
    }

    pub async fn authorize_cancel(&self, user: &str, job: &Job) -> Result<(), AuthzError> {
        check_user(user)?;
        if job.auth_strategy().is_default() {
            return if job.owner() == user {
                Ok(())
            } else {
                Err(AuthzError::denied(format!(
                    "User {} may not cancel job {}",
                    user,
                    job.id()
                )))
            };
        }
        tracing::debug!(authorizer = self.name(), job_id = %job.id(), user, "delegating cancel check");
        self.external.authorize_cancel(user, job).await
    }

    pub async fn authorize_delete(&self, user: &str, job: &Job) -> Result<(), AuthzError> {
        check_user(user)?;
        if job.auth_strategy().is_default() {
            return if job.owner() == user {
                Ok(())
            } else {
                Err(AuthzError::denied(format!(
                    "User {} may not delete job {}",
                    user,
                    job.id()
                )))
            };
        }
        tracing::debug!(authorizer = self.name(), job_id = %job.id(), user, "delegating delete check");
        self.external.authorize_delete(user, job).await
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::default_only()
    }
}

impl core::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Authorizer")
            .field("external", &self.external.name())
            .finish()
    }
}

fn check_user(user: &str) -> Result<(), AuthzError> {
    if user.is_empty() {
        return Err(AuthzError::invalid_input("user cannot be null or empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use jobstate_core::{JobId, JobMetadata, JobRecord};

    use super::*;

    /// Allows everything and counts how often it was asked.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExternalAuthorization for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn authorize_create(
            &self,
            _strategy: &AuthorizationStrategy,
            _auth_param: &str,
        ) -> Result<(), AuthzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn authorize_read(&self, _user: &str, _job: &Job) -> Result<(), AuthzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn authorize_read_params(
            &self,
            _strategy: &AuthorizationStrategy,
            _user: &str,
            _auth_params: &[String],
        ) -> Result<(), AuthzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn authorize_cancel(&self, _user: &str, _job: &Job) -> Result<(), AuthzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn authorize_delete(&self, _user: &str, _job: &Job) -> Result<(), AuthzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn job(owner: &str, strategy: AuthorizationStrategy, param: &str, shared: &[&str]) -> Job {
        let mut record = JobRecord::unstarted(
            JobId::new(),
            owner,
            strategy,
            param,
            &JobMetadata::empty(),
            Utc::now(),
        );
        record.shared = shared.iter().map(|s| s.to_string()).collect();
        Job::from(record)
    }

    fn custom() -> AuthorizationStrategy {
        AuthorizationStrategy::new("custom").unwrap()
    }

    #[tokio::test]
    async fn default_read_allows_owner_and_shared_users() {
        let authz = Authorizer::default();
        let j = job("alice", AuthorizationStrategy::DEFAULT, "DEFAULT", &["bob"]);

        authz.authorize_read("alice", &j).await.unwrap();
        authz.authorize_read("bob", &j).await.unwrap();

        let err = authz.authorize_read("carol", &j).await.unwrap_err();
        assert_eq!(
            err,
            AuthzError::Denied(format!("Job {} is not viewable by user carol", j.id()))
        );
    }

    #[tokio::test]
    async fn default_cancel_and_delete_are_owner_only() {
        let authz = Authorizer::default();
        let j = job("alice", AuthorizationStrategy::DEFAULT, "DEFAULT", &["bob"]);

        authz.authorize_cancel("alice", &j).await.unwrap();
        authz.authorize_delete("alice", &j).await.unwrap();

        let err = authz.authorize_cancel("bob", &j).await.unwrap_err();
        assert_eq!(err.to_string(), format!("User bob may not cancel job {}", j.id()));
        let err = authz.authorize_delete("bob", &j).await.unwrap_err();
        assert_eq!(err.to_string(), format!("User bob may not delete job {}", j.id()));
    }

    #[tokio::test]
    async fn arguments_are_validated_before_policy() {
        let authz = Authorizer::default();
        let j = job("alice", AuthorizationStrategy::DEFAULT, "DEFAULT", &[]);

        let err = authz
            .authorize_create(&AuthorizationStrategy::DEFAULT, "")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "authParam cannot be null or empty");

        let err = authz.authorize_read("", &j).await.unwrap_err();
        assert_eq!(err.to_string(), "user cannot be null or empty");

        let err = authz
            .authorize_read_params(&AuthorizationStrategy::DEFAULT, "alice", &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "authParams cannot be null or empty");

        let err = authz
            .authorize_read_params(&AuthorizationStrategy::DEFAULT, "alice", &["".into()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "authParam cannot be null or empty");
    }

    #[tokio::test]
    async fn non_default_without_hooks_is_unimplemented() {
        let authz = Authorizer::default();
        let j = job("alice", custom(), "42", &[]);

        let err = authz.authorize_create(&custom(), "42").await.unwrap_err();
        assert_eq!(err, AuthzError::Unimplemented("custom".into()));
        assert!(matches!(
            authz.authorize_read("alice", &j).await,
            Err(AuthzError::Unimplemented(_))
        ));
        assert!(matches!(
            authz.authorize_cancel("alice", &j).await,
            Err(AuthzError::Unimplemented(_))
        ));
        assert!(matches!(
            authz.authorize_delete("alice", &j).await,
            Err(AuthzError::Unimplemented(_))
        ));
        assert!(matches!(
            authz
                .authorize_read_params(&custom(), "alice", &["42".into()])
                .await,
            Err(AuthzError::Unimplemented(_))
        ));
    }

    #[tokio::test]
    async fn only_non_default_jobs_reach_the_hooks() {
        let hooks = Arc::new(Counting::default());
        let authz = Authorizer::from_arc(hooks.clone());

        let default_job = job("alice", AuthorizationStrategy::DEFAULT, "DEFAULT", &[]);
        authz.authorize_read("alice", &default_job).await.unwrap();
        authz
            .authorize_create(&AuthorizationStrategy::DEFAULT, "DEFAULT")
            .await
            .unwrap();
        assert_eq!(hooks.calls.load(Ordering::SeqCst), 0);

        // The hook decides, even for a user the default policy would reject.
        let custom_job = job("alice", custom(), "42", &[]);
        authz.authorize_read("carol", &custom_job).await.unwrap();
        authz.authorize_cancel("carol", &custom_job).await.unwrap();
        authz.authorize_delete("carol", &custom_job).await.unwrap();
        authz.authorize_create(&custom(), "42").await.unwrap();
        authz
            .authorize_read_params(&custom(), "carol", &["42".into()])
            .await
            .unwrap();
        assert_eq!(hooks.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_hooks() {
        let hooks = Arc::new(Counting::default());
        let authz = Authorizer::from_arc(hooks.clone());

        assert!(authz.authorize_create(&custom(), "").await.is_err());
        assert!(
            authz
                .authorize_read_params(&custom(), "", &["1".into()])
                .await
                .is_err()
        );
        assert_eq!(hooks.calls.load(Ordering::SeqCst), 0);
    }
}
