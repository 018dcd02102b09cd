use strata_store::StoreError;
use strata_types::Address;

/// Errors from commit graph walks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// A walk was started from, or reached a parent reference to, a commit
    /// that is not stored.
    #[error("commit not found: {0}")]
    CommitNotFound(Address),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DagResult<T> = Result<T, DagError>;
