use strata_dag::DagError;
use strata_hash::HashError;
use strata_merkle::{Differences, MerkleError};
use strata_store::StoreError;
use strata_types::PathError;

/// Errors surfaced by index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// Entity missing, or a read-through miss. Store- and tree-level
    /// not-found conditions all fold into this.
    #[error("not found")]
    NotFound,

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("repository already exists: {0:?}")]
    RepoAlreadyExists(String),

    #[error("branch already exists: {0:?}")]
    BranchAlreadyExists(String),

    #[error("branch not found: {0:?}")]
    BranchNotFound(String),

    #[error("no common merge base found")]
    NoMergeBase,

    #[error("merge destination has uncommitted changes")]
    DestinationNotCommitted,

    /// The only error that carries partial results: the operations
    /// collected before the conflict was detected, so callers can present
    /// the conflict set.
    #[error("merge conflict ({} operations)", .operations.len())]
    MergeConflict { operations: Differences },

    #[error("failed to apply merge changes to destination tree")]
    MergeUpdateFailed,

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Merkle(MerkleError),

    #[error(transparent)]
    Dag(DagError),

    #[error(transparent)]
    Store(StoreError),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl From<StoreError> for IndexError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

impl From<MerkleError> for IndexError {
    fn from(e: MerkleError) -> Self {
        match e {
            MerkleError::NotFound(_) => Self::NotFound,
            MerkleError::Store(StoreError::NotFound) => Self::NotFound,
            MerkleError::Path(p) => Self::Path(p),
            MerkleError::Hash(h) => Self::Hash(h),
            other => Self::Merkle(other),
        }
    }
}

impl From<DagError> for IndexError {
    fn from(e: DagError) -> Self {
        match e {
            DagError::CommitNotFound(_) => Self::NotFound,
            DagError::Store(StoreError::NotFound) => Self::NotFound,
            other => Self::Dag(other),
        }
    }
}
