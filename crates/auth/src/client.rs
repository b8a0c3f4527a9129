//! Client side of the workspace permission authority.
//!
//! The authority speaks JSON-RPC 1.1 over HTTP POST. Two calls are used:
//! `Workspace.ver` to confirm the endpoint at startup and
//! `Workspace.get_permissions_mass` to fetch per-user permission codes for a
//! batch of workspace IDs.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("{0}")]
    Transport(String),

    /// The authority answered with a JSON-RPC error.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    #[error("unexpected response from the workspace service: {0}")]
    Malformed(String),

    #[error("{0}")]
    InvalidUrl(String),
}

/// Source of permission data for workspaces.
///
/// Returned maps are keyed by user name with single-letter permission codes
/// as values, one map per requested ID and in request order.
#[async_trait]
pub trait PermissionAuthority: Send + Sync {
    async fn version(&self) -> Result<String, AuthorityError>;

    async fn permissions(
        &self,
        workspace_ids: &[u64],
    ) -> Result<Vec<HashMap<String, String>>, AuthorityError>;
}

#[async_trait]
impl<A: PermissionAuthority + ?Sized> PermissionAuthority for std::sync::Arc<A> {
    async fn version(&self) -> Result<String, AuthorityError> {
        (**self).version().await
    }

    async fn permissions(
        &self,
        workspace_ids: &[u64],
    ) -> Result<Vec<HashMap<String, String>>, AuthorityError> {
        (**self).permissions(workspace_ids).await
    }
}

/// HTTP JSON-RPC client for the workspace service.
#[derive(Clone)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    url: reqwest::Url,
    token: Option<String>,
}

impl WorkspaceClient {
    pub fn new(url: reqwest::Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            token: None,
        }
    }

    /// Send `token` in the `Authorization` header on every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, AuthorityError> {
        let body = json!({
            "version": "1.1",
            "method": method,
            "params": params,
            "id": Uuid::now_v7().to_string(),
        });

        let mut request = self.http.post(self.url.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await.map_err(|e| {
            AuthorityError::Transport(format!("request to '{}' failed: {}", self.url, e))
        })?;
        let status = response.status();

        // Errors arrive as JSON bodies on non-2xx responses, so parse first.
        let payload: Value = response.json().await.map_err(|e| {
            AuthorityError::Transport(format!(
                "'{}' returned status {} with an unreadable body: {}",
                self.url, status, e
            ))
        })?;
        tracing::debug!(method, %status, "workspace service responded");
        parse_rpc_response(payload)
    }
}

impl core::fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("url", &self.url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermissionsMass {
    perms: Vec<HashMap<String, String>>,
}

/// Unwrap a JSON-RPC 1.1 response whose `result` is a one-element array.
fn parse_rpc_response<T: DeserializeOwned>(payload: Value) -> Result<T, AuthorityError> {
    let response: RpcResponse =
        serde_json::from_value(payload).map_err(|e| AuthorityError::Malformed(e.to_string()))?;

    if let Some(err) = response.error {
        return Err(AuthorityError::Remote {
            name: err.name.unwrap_or_else(|| "JSONRPCError".to_string()),
            message: err.message.unwrap_or_default(),
        });
    }

    let result = response
        .result
        .ok_or_else(|| AuthorityError::Malformed("missing result".to_string()))?;
    let first = match result {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => {
            return Err(AuthorityError::Malformed(format!(
                "expected a non-empty result array, got {other}"
            )));
        }
    };
    serde_json::from_value(first).map_err(|e| AuthorityError::Malformed(e.to_string()))
}

#[async_trait]
impl PermissionAuthority for WorkspaceClient {
    async fn version(&self) -> Result<String, AuthorityError> {
        self.call("Workspace.ver", json!([])).await
    }

    async fn permissions(
        &self,
        workspace_ids: &[u64],
    ) -> Result<Vec<HashMap<String, String>>, AuthorityError> {
        let workspaces: Vec<Value> = workspace_ids.iter().map(|id| json!({ "id": id })).collect();
        let mass: PermissionsMass = self
            .call(
                "Workspace.get_permissions_mass",
                json!([{ "workspaces": workspaces }]),
            )
            .await?;
        if mass.perms.len() != workspace_ids.len() {
            return Err(AuthorityError::Malformed(format!(
                "asked for {} permission sets, received {}",
                workspace_ids.len(),
                mass.perms.len()
            )));
        }
        Ok(mass.perms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_result() {
        let v: String = parse_rpc_response(json!({
            "version": "1.1",
            "id": "1",
            "result": ["0.14.2"]
        }))
        .unwrap();
        assert_eq!(v, "0.14.2");
    }

    #[test]
    fn parses_permission_batches() {
        let mass: PermissionsMass = parse_rpc_response(json!({
            "version": "1.1",
            "result": [{ "perms": [{ "alice": "a", "*": "r" }, { "bob": "w" }] }]
        }))
        .unwrap();
        assert_eq!(mass.perms.len(), 2);
        assert_eq!(mass.perms[0]["alice"], "a");
        assert_eq!(mass.perms[1]["bob"], "w");
    }

    #[test]
    fn surfaces_remote_errors() {
        let err = parse_rpc_response::<String>(json!({
            "version": "1.1",
            "error": { "name": "JSONRPCError", "code": -32500, "message": "No workspace with id 7 exists" }
        }))
        .unwrap_err();
        assert_eq!(
            err,
            AuthorityError::Remote {
                name: "JSONRPCError".into(),
                message: "No workspace with id 7 exists".into()
            }
        );
    }

    #[test]
    fn rejects_missing_or_empty_results() {
        assert!(matches!(
            parse_rpc_response::<String>(json!({ "version": "1.1" })),
            Err(AuthorityError::Malformed(_))
        ));
        assert!(matches!(
            parse_rpc_response::<String>(json!({ "result": [] })),
            Err(AuthorityError::Malformed(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let client = WorkspaceClient::new("https://ws.example.org/services/ws".parse().unwrap())
            .with_token("s3cr3t");
        assert!(!format!("{client:?}").contains("s3cr3t"));
    }
}
