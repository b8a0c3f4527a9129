use serde::{Deserialize, Serialize};

/// A user's access level on a resource held by the workspace authority.
///
/// Reported on the wire as single-letter codes: `n`, `r`, `w`, `a`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    None,
    Read,
    Write,
    Admin,
}

impl PermissionLevel {
    /// Parse a wire code. Unknown codes grant nothing.
    pub fn from_code(code: &str) -> Self {
        match code {
            "r" => PermissionLevel::Read,
            "w" => PermissionLevel::Write,
            "a" => PermissionLevel::Admin,
            _ => PermissionLevel::None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PermissionLevel::None => "n",
            PermissionLevel::Read => "r",
            PermissionLevel::Write => "w",
            PermissionLevel::Admin => "a",
        }
    }

    pub fn can_read(&self) -> bool {
        *self >= PermissionLevel::Read
    }

    pub fn can_write(&self) -> bool {
        *self >= PermissionLevel::Write
    }

    pub fn satisfies(&self, required: Capability) -> bool {
        match required {
            Capability::Read => self.can_read(),
            Capability::Write => self.can_write(),
            Capability::Admin => *self == PermissionLevel::Admin,
        }
    }
}

impl core::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Minimum level an operation demands on the job's resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Admin,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
