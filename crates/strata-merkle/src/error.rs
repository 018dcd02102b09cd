use strata_hash::HashError;
use strata_store::StoreError;
use strata_types::{Address, PathError};

/// Errors from tree operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MerkleError {
    /// The walked path does not resolve to an entry of the requested kind.
    #[error("path not found: {0:?}")]
    NotFound(String),

    /// A node referenced by a stored entry is missing from the store.
    #[error("tree node missing from store: {0}")]
    MissingNode(Address),

    /// An object referenced by a stored entry is missing from the store.
    #[error("object record missing from store: {0}")]
    MissingObject(Address),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MerkleError {
    /// Returns `true` if this error means "nothing at that path", as
    /// opposed to a real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type MerkleResult<T> = Result<T, MerkleError>;
