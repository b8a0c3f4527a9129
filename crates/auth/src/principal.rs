use crate::authorize::AuthzError;

/// Caller identity a delegated authorizer is bound to: the user name and
/// the credential forwarded to the permission authority.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    user: String,
    token: String,
}

impl Principal {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Result<Self, AuthzError> {
        let user = user.into();
        let token = token.into();
        if user.is_empty() {
            return Err(AuthzError::invalid_input("user cannot be null or empty"));
        }
        if token.is_empty() {
            return Err(AuthzError::invalid_input("token cannot be null or empty"));
        }
        Ok(Self { user, token })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// Tokens never reach logs.
impl core::fmt::Debug for Principal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Principal")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_token() {
        let p = Principal::new("alice", "s3cr3t").unwrap();
        let rendered = format!("{p:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(Principal::new("", "t").is_err());
        assert!(Principal::new("alice", "").is_err());
    }
}
