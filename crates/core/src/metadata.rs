//! User metadata captured at job creation.
//!
//! In memory this is an ordinary map. Persisted documents store it as an
//! array of `{k, v}` pairs for compatibility with existing data; conversion
//! happens only at the storage boundary ([`MetaPair`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Maximum size in bytes of a single key plus its value.
pub const MAX_METADATA_ENTRY_BYTES: usize = 900;
/// Maximum size in bytes of all keys and values together.
pub const MAX_METADATA_BYTES: usize = 16_000;

/// Validated string-to-string metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobMetadata(BTreeMap<String, String>);

/// Persisted shape of one metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPair {
    pub k: String,
    pub v: String,
}

impl JobMetadata {
    pub fn new(entries: BTreeMap<String, String>) -> DomainResult<Self> {
        let mut total = 0usize;
        for (k, v) in &entries {
            if k.is_empty() {
                return Err(DomainError::validation(
                    "metadata keys cannot be null or the empty string",
                ));
            }
            let size = k.len() + v.len();
            if size > MAX_METADATA_ENTRY_BYTES {
                return Err(DomainError::validation(format!(
                    "Total size of metadata key + value exceeds maximum of {MAX_METADATA_ENTRY_BYTES}B for key {k}"
                )));
            }
            total += size;
        }
        if total > MAX_METADATA_BYTES {
            return Err(DomainError::validation(format!(
                "Metadata size exceeds maximum of {MAX_METADATA_BYTES}B"
            )));
        }
        Ok(Self(entries))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }

    pub fn to_pairs(&self) -> Vec<MetaPair> {
        self.0
            .iter()
            .map(|(k, v)| MetaPair {
                k: k.clone(),
                v: v.clone(),
            })
            .collect()
    }

    /// Rebuild from persisted pairs. Stored data is trusted; later duplicate
    /// keys win.
    pub fn from_pairs(pairs: &[MetaPair]) -> Self {
        Self(
            pairs
                .iter()
                .map(|p| (p.k.clone(), p.v.clone()))
                .collect(),
        )
    }
}

impl TryFrom<BTreeMap<String, String>> for JobMetadata {
    type Error = DomainError;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
