//! `jobstate-auth` — authorization for job operations.
//!
//! [`Authorizer`] validates inputs and applies the default ACL policy; other
//! strategies are delegated to an [`ExternalAuthorization`] implementation,
//! such as the workspace-backed [`WorkspaceAuthorizer`].

pub mod authorize;
pub mod client;
pub mod permissions;
pub mod principal;
pub mod workspace;

pub use authorize::{Authorizer, AuthzError, ExternalAuthorization, NoExternalAuthorization};
pub use client::{AuthorityError, PermissionAuthority, WorkspaceClient};
pub use permissions::{Capability, PermissionLevel};
pub use principal::Principal;
pub use workspace::{
    MAX_WORKSPACE_IDS, WORKSPACE_STRATEGY, WorkspaceAuthorizationFactory, WorkspaceAuthorizer,
    WorkspacePolicy,
};
