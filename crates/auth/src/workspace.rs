//! Delegated authorization against the workspace service.
//!
//! Jobs created under the `kbaseworkspace` strategy carry a workspace ID as
//! their authorization parameter; access follows the caller's permission on
//! that workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use jobstate_core::{AuthorizationStrategy, Job};

use crate::authorize::{Authorizer, AuthzError, ExternalAuthorization};
use crate::client::{AuthorityError, PermissionAuthority, WorkspaceClient};
use crate::permissions::{Capability, PermissionLevel};
use crate::principal::Principal;

pub const WORKSPACE_STRATEGY: &str = "kbaseworkspace";

/// Largest batch of workspace IDs accepted by one listing check.
pub const MAX_WORKSPACE_IDS: usize = 10;

/// Capability required on the workspace for each mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacePolicy {
    pub create: Capability,
    pub cancel: Capability,
    pub delete: Capability,
}

impl Default for WorkspacePolicy {
    fn default() -> Self {
        Self {
            create: Capability::Write,
            cancel: Capability::Write,
            delete: Capability::Write,
        }
    }
}

/// Authorizer hooks bound to one caller and one permission authority.
pub struct WorkspaceAuthorizer<A> {
    principal: Principal,
    authority: A,
    policy: WorkspacePolicy,
}

impl<A: PermissionAuthority> WorkspaceAuthorizer<A> {
    pub fn new(principal: Principal, authority: A, policy: WorkspacePolicy) -> Self {
        Self {
            principal,
            authority,
            policy,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    fn check_strategy(&self, strategy: &AuthorizationStrategy) -> Result<(), AuthzError> {
        if strategy.as_str() != WORKSPACE_STRATEGY {
            return Err(AuthzError::denied(format!(
                "Invalid authorization strategy: {strategy}"
            )));
        }
        Ok(())
    }

    fn check_user(&self, user: &str) -> Result<(), AuthzError> {
        if user != self.principal.user() {
            return Err(AuthzError::IdentityMismatch {
                bound: self.principal.user().to_string(),
                supplied: user.to_string(),
            });
        }
        Ok(())
    }

    async fn levels(&self, auth_params: &[String]) -> Result<Vec<PermissionLevel>, AuthzError> {
        let ids = auth_params
            .iter()
            .map(|p| parse_workspace_id(p))
            .collect::<Result<Vec<_>, _>>()?;

        let perms = self
            .authority
            .permissions(&ids)
            .await
            .map_err(contact_error)?;
        if perms.len() != ids.len() {
            return Err(contact_error(AuthorityError::Malformed(format!(
                "asked for {} permission sets, received {}",
                ids.len(),
                perms.len()
            ))));
        }

        let user = self.principal.user();
        Ok(perms
            .iter()
            .map(|m| {
                m.get(user)
                    .map(|code| PermissionLevel::from_code(code))
                    .unwrap_or(PermissionLevel::None)
            })
            .collect())
    }

    async fn require(&self, auth_param: &str, required: Capability) -> Result<(), AuthzError> {
        let levels = self.levels(&[auth_param.to_string()]).await?;
        let level = levels.first().copied().unwrap_or(PermissionLevel::None);
        if level.satisfies(required) {
            Ok(())
        } else {
            tracing::debug!(
                user = self.principal.user(),
                workspace = auth_param,
                %level,
                %required,
                "workspace permission insufficient"
            );
            Err(AuthzError::denied(denial(
                self.principal.user(),
                auth_param,
                required,
            )))
        }
    }
}

#[async_trait]
impl<A: PermissionAuthority> ExternalAuthorization for WorkspaceAuthorizer<A> {
    fn name(&self) -> &str {
        WORKSPACE_STRATEGY
    }

    async fn authorize_create(
        &self,
        strategy: &AuthorizationStrategy,
        auth_param: &str,
    ) -> Result<(), AuthzError> {
        self.check_strategy(strategy)?;
        self.require(auth_param, self.policy.create).await
    }

    async fn authorize_read(&self, user: &str, job: &Job) -> Result<(), AuthzError> {
        self.check_user(user)?;
        self.check_strategy(job.auth_strategy())?;
        if job.owner() == user {
            return Ok(());
        }
        self.require(job.auth_param(), Capability::Read).await
    }

    async fn authorize_read_params(
        &self,
        strategy: &AuthorizationStrategy,
        user: &str,
        auth_params: &[String],
    ) -> Result<(), AuthzError> {
        self.check_user(user)?;
        self.check_strategy(strategy)?;
        if auth_params.len() > MAX_WORKSPACE_IDS {
            return Err(AuthzError::invalid_input(format!(
                "No more than {MAX_WORKSPACE_IDS} workspace IDs may be specified"
            )));
        }
        let levels = self.levels(auth_params).await?;
        for (param, level) in auth_params.iter().zip(levels) {
            if !level.can_read() {
                return Err(AuthzError::denied(denial(user, param, Capability::Read)));
            }
        }
        Ok(())
    }

    async fn authorize_cancel(&self, user: &str, job: &Job) -> Result<(), AuthzError> {
        self.check_user(user)?;
        self.check_strategy(job.auth_strategy())?;
        self.require(job.auth_param(), self.policy.cancel).await
    }

    async fn authorize_delete(&self, user: &str, job: &Job) -> Result<(), AuthzError> {
        self.check_user(user)?;
        self.check_strategy(job.auth_strategy())?;
        self.require(job.auth_param(), self.policy.delete).await
    }
}

/// Builds per-caller authorizers for one workspace service endpoint.
#[derive(Debug, Clone)]
pub struct WorkspaceAuthorizationFactory {
    url: reqwest::Url,
    version: String,
    policy: WorkspacePolicy,
}

impl WorkspaceAuthorizationFactory {
    /// Check the URL and confirm the endpoint answers `Workspace.ver`.
    pub async fn connect(url: reqwest::Url, allow_insecure: bool) -> Result<Self, AuthorityError> {
        check_url(&url, allow_insecure)?;
        let version = WorkspaceClient::new(url.clone()).version().await?;
        tracing::info!(%url, %version, "connected to workspace service");
        Ok(Self {
            url,
            version,
            policy: WorkspacePolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: WorkspacePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    /// Version string reported by the service at connect time.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn policy(&self) -> WorkspacePolicy {
        self.policy
    }

    pub fn build_authorizer(&self, principal: Principal) -> Authorizer {
        let client = WorkspaceClient::new(self.url.clone()).with_token(principal.token());
        Authorizer::new(WorkspaceAuthorizer::new(principal, client, self.policy))
    }
}

fn check_url(url: &reqwest::Url, allow_insecure: bool) -> Result<(), AuthorityError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_insecure => {
            tracing::warn!(%url, "workspace service URL is insecure; tokens will be sent in the clear");
            Ok(())
        }
        "http" => Err(AuthorityError::InvalidUrl(format!(
            "refusing insecure workspace service URL {url}"
        ))),
        other => Err(AuthorityError::InvalidUrl(format!(
            "unsupported scheme {other} in workspace service URL {url}"
        ))),
    }
}

fn parse_workspace_id(auth_param: &str) -> Result<u64, AuthzError> {
    match auth_param.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AuthzError::denied(format!(
            "The string {auth_param} is not a valid integer workspace ID"
        ))),
    }
}

fn contact_error(err: AuthorityError) -> AuthzError {
    AuthzError::Authority(format!(
        "Error contacting the workspace service to get permissions: {err}"
    ))
}

fn denial(user: &str, workspace: &str, required: Capability) -> String {
    match required {
        Capability::Read => format!("User {user} cannot read workspace {workspace}"),
        Capability::Write => format!("User {user} cannot write to workspace {workspace}"),
        Capability::Admin => {
            format!("User {user} does not have administration rights for workspace {workspace}")
        }
    }
}
