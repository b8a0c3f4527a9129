//! Boundary validation for caller-supplied strings.
//!
//! Lengths are counted in characters, not bytes.

use crate::error::{DomainError, DomainResult};

pub const MAX_LEN_USER: usize = 100;
pub const MAX_LEN_SERVICE: usize = 100;
pub const MAX_LEN_STATUS: usize = 200;
pub const MAX_LEN_DESC: usize = 1000;
pub const MAX_LEN_ERR: usize = 100_000;

/// Require a non-empty string, optionally bounded in length.
pub fn check_string(value: &str, name: &str, max_len: Option<usize>) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::validation(format!(
            "{name} cannot be null or the empty string"
        )));
    }
    if let Some(max) = max_len {
        check_max_len(Some(value), name, max)?;
    }
    Ok(())
}

/// Bound an optional string's length. Absent and empty values pass.
pub fn check_max_len(value: Option<&str>, name: &str, max_len: usize) -> DomainResult<()> {
    match value {
        Some(v) if v.chars().count() > max_len => Err(DomainError::validation(format!(
            "{name} exceeds the maximum length of {max_len}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_rejected_with_field_name() {
        let err = check_string("", "service", Some(MAX_LEN_SERVICE)).unwrap_err();
        assert_eq!(err.message(), "service cannot be null or the empty string");
    }

    #[test]
    fn boundary_length_is_accepted() {
        let s = "a".repeat(MAX_LEN_USER);
        check_string(&s, "user", Some(MAX_LEN_USER)).unwrap();

        let s = "a".repeat(MAX_LEN_USER + 1);
        let err = check_string(&s, "user", Some(MAX_LEN_USER)).unwrap_err();
        assert_eq!(err.message(), "user exceeds the maximum length of 100");
    }

    #[test]
    fn multibyte_counts_characters() {
        let s = "é".repeat(MAX_LEN_STATUS);
        check_max_len(Some(&s), "status", MAX_LEN_STATUS).unwrap();
    }

    #[test]
    fn absent_optional_passes() {
        check_max_len(None, "status", MAX_LEN_STATUS).unwrap();
        check_max_len(Some(""), "status", MAX_LEN_STATUS).unwrap();
    }
}
