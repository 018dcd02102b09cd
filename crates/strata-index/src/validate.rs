//! Input validation, applied before any transaction begins.
//!
//! Repository ids and branch ids share one restricted alphabet: letters,
//! digits, `-` and `_`, at most [`MAX_ID_LENGTH`] characters. A ref
//! additionally accepts anything hash-shaped, which the resolver will try
//! as a commit address first.

use strata_hash::ident;

use crate::error::{IndexError, IndexResult};
use strata_types::Address;

/// Upper bound on repository and branch id length.
pub const MAX_ID_LENGTH: usize = 64;

/// Upper bound on object path length.
pub const MAX_PATH_LENGTH: usize = 1024;

fn is_valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_ID_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate a repository id.
pub fn validate_repo_id(id: &str) -> IndexResult<()> {
    if is_valid_id(id) {
        return Ok(());
    }
    Err(IndexError::Validation {
        field: "repository id",
        reason: format!("{id:?} must be 1-{MAX_ID_LENGTH} letters, digits, '-' or '_'"),
    })
}

/// Validate a ref: either a hash-shaped commit address or a branch id.
pub fn validate_ref(reference: &str) -> IndexResult<()> {
    if ident::is_hash(reference) || is_valid_id(reference) {
        return Ok(());
    }
    Err(IndexError::Validation {
        field: "ref",
        reason: format!("{reference:?} is neither a commit address nor a valid branch id"),
    })
}

/// Validate a commit id: must be hash-shaped.
pub fn validate_commit_id(id: &str) -> IndexResult<()> {
    if ident::is_hash(id) {
        return Ok(());
    }
    Err(IndexError::Validation {
        field: "commit id",
        reason: format!("{id:?} is not a commit address"),
    })
}

/// Validate a commit message: non-empty.
pub fn validate_commit_message(message: &str) -> IndexResult<()> {
    if message.is_empty() {
        return Err(IndexError::Validation {
            field: "commit message",
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

/// Validate a path. The empty path is allowed; it denotes the tree root
/// for listing and revert operations.
pub fn validate_path(path: &str) -> IndexResult<()> {
    let reason = if path.len() > MAX_PATH_LENGTH {
        Some(format!("longer than {MAX_PATH_LENGTH} characters"))
    } else if path.starts_with('/') {
        Some("must not start with '/'".into())
    } else if path.contains("//") {
        Some("must not contain empty segments".into())
    } else if path.chars().any(char::is_control) {
        Some("must not contain control characters".into())
    } else {
        None
    };
    match reason {
        Some(reason) => Err(IndexError::Validation {
            field: "path",
            reason,
        }),
        None => Ok(()),
    }
}

/// Parse a validated commit id into an address.
pub(crate) fn parse_commit_address(s: &str, field: &'static str) -> IndexResult<Address> {
    if !ident::is_hash(s) {
        return Err(IndexError::Validation {
            field,
            reason: format!("{s:?} is not a commit address"),
        });
    }
    Address::from_hex(s).map_err(|e| IndexError::Validation {
        field,
        reason: e.to_string(),
    })
}
