use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Authorization parameter recorded for jobs created under the default
/// strategy. Unused by the default policy, but never empty.
pub const DEFAULT_AUTH_PARAM: &str = "DEFAULT";

/// Named authorization policy a job was created under.
///
/// Strategies are opaque names (e.g. `"kbaseworkspace"`); equality is by name.
/// [`AuthorizationStrategy::DEFAULT`] denotes the built-in ACL policy (owner
/// plus share list).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationStrategy(Cow<'static, str>);

impl AuthorizationStrategy {
    pub const DEFAULT: AuthorizationStrategy = AuthorizationStrategy(Cow::Borrowed("DEFAULT"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> DomainResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::validation("strategy cannot be null or empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for AuthorizationStrategy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl core::fmt::Display for AuthorizationStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_name() {
        let a = AuthorizationStrategy::new("DEFAULT").unwrap();
        assert_eq!(a, AuthorizationStrategy::DEFAULT);
        assert!(a.is_default());

        let ws = AuthorizationStrategy::new(String::from("kbaseworkspace")).unwrap();
        assert_ne!(ws, AuthorizationStrategy::DEFAULT);
        assert!(!ws.is_default());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = AuthorizationStrategy::new("").unwrap_err();
        assert_eq!(err.message(), "strategy cannot be null or empty");
    }
}
