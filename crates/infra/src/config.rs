//! Configuration loaded from the environment.

use thiserror::Error;

pub const DATABASE_URL: &str = "JOBSTATE_DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "JOBSTATE_DB_MAX_CONNECTIONS";
pub const WORKSPACE_URL: &str = "JOBSTATE_WORKSPACE_URL";
pub const WORKSPACE_ALLOW_INSECURE: &str = "JOBSTATE_WORKSPACE_ALLOW_INSECURE";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub url: reqwest::Url,
    pub allow_insecure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStateConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Present when the workspace-delegated strategy is enabled.
    pub workspace: Option<WorkspaceConfig>,
}

impl JobStateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(DATABASE_URL)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;

        let max_connections = match lookup(DB_MAX_CONNECTIONS) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: DB_MAX_CONNECTIONS,
                        reason: format!("expected a positive integer, got {raw:?}"),
                    });
                }
            },
            None => {
                tracing::warn!(
                    default = DEFAULT_MAX_CONNECTIONS,
                    "{DB_MAX_CONNECTIONS} not set; using default"
                );
                DEFAULT_MAX_CONNECTIONS
            }
        };

        let allow_insecure = match lookup(WORKSPACE_ALLOW_INSECURE).as_deref() {
            None | Some("") | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: WORKSPACE_ALLOW_INSECURE,
                    reason: format!("expected true or false, got {other:?}"),
                });
            }
        };

        let workspace = match lookup(WORKSPACE_URL).filter(|v| !v.is_empty()) {
            Some(raw) => {
                let url = raw.parse::<reqwest::Url>().map_err(|e| ConfigError::Invalid {
                    name: WORKSPACE_URL,
                    reason: e.to_string(),
                })?;
                Some(WorkspaceConfig {
                    url,
                    allow_insecure,
                })
            }
            None => None,
        };

        Ok(Self {
            database_url,
            max_connections,
            workspace,
        })
    }
}
