//! Transactional record store for the strata index.
//!
//! This crate defines the storage boundary the index core runs against:
//! - [`Store`]: opens per-repository and cross-repository transactions
//! - [`RepoOperations`]: typed CRUD over every record kind within one repo
//! - [`ClientOperations`]: the small cross-repo surface (list/get/delete)
//! - [`MemStore`]: an in-memory reference implementation for tests and
//!   embedding
//!
//! Per-repository transactions are serializable: a transaction observes a
//! stable snapshot and its writes become visible atomically on commit, or
//! not at all.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemStore;
pub use traits::{
    ClientOperations, ClientTransaction, RepoOperations, RepoTransaction, Store, TxMode,
};
