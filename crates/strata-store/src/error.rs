/// Errors produced by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The sentinel for missing keys. Callers routinely match on this to
    /// distinguish "not there" from real failures.
    #[error("record not found")]
    NotFound,

    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
