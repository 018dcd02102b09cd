//! Reference resolution: a ref string names either a commit directly (by
//! content address) or a branch.

use std::fmt;

use strata_hash::ident;
use strata_store::{RepoOperations, StoreError};
use strata_types::{Address, Branch, Commit};

use crate::error::{IndexError, IndexResult};

/// A resolved ref.
#[derive(Clone, Debug)]
pub(crate) enum Reference {
    /// Resolved directly to a commit.
    Commit(Commit),
    /// Resolved to a branch and its head commit.
    Branch { branch: Branch, commit: Commit },
}

impl Reference {
    pub(crate) fn commit(&self) -> &Commit {
        match self {
            Self::Commit(commit) => commit,
            Self::Branch { commit, .. } => commit,
        }
    }

    pub(crate) fn branch(&self) -> Option<&Branch> {
        match self {
            Self::Commit(_) => None,
            Self::Branch { branch, .. } => Some(branch),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(commit) => write!(
                f,
                "[commit='{}' -> root='{}']",
                commit.address.short_hex(),
                commit.tree.short_hex()
            ),
            Self::Branch { branch, commit } => write!(
                f,
                "[branch='{}' -> commit='{}' -> root='{}']",
                branch.id,
                commit.address.short_hex(),
                commit.tree.short_hex()
            ),
        }
    }
}

/// Resolve a ref string inside a transaction.
///
/// Hash-shaped refs are tried as commit addresses first; anything else,
/// and hash-shaped refs that match no commit, are treated as branch ids.
pub(crate) fn resolve_ref(tx: &dyn RepoOperations, reference: &str) -> IndexResult<Reference> {
    if ident::is_hash(reference) {
        let address = Address::from_hex(reference).map_err(|e| IndexError::Validation {
            field: "ref",
            reason: e.to_string(),
        })?;
        match tx.read_commit(&address) {
            Ok(commit) => return Ok(Reference::Commit(commit)),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    let branch = tx.read_branch(reference)?;
    let commit = tx.read_commit(&branch.commit_id)?;
    Ok(Reference::Branch { branch, commit })
}
