//! Versioned metadata index over a content-addressed object store.
//!
//! A Git-like branching and commit system layered over a transactional
//! record store. This crate is the public façade: it composes the tree
//! engine, the commit DAG and the per-branch workspace overlay into the
//! full operation set: staged reads and writes, commits, reverts,
//! three-way diff and merge, and prefix listings that fuse committed
//! state with staged changes.
//!
//! Writes stage into a branch workspace; a probabilistic partial commit
//! folds staged entries into the branch's workspace tree as write traffic
//! flows, so an explicit [`Index::commit`] only snapshots an
//! already-built tree.

pub mod error;
pub mod index;
mod reference;
pub mod validate;

pub use error::{IndexError, IndexResult};
pub use index::{Clock, Index, DEFAULT_BRANCH, DEFAULT_PARTIAL_COMMIT_RATIO};
pub use validate::{
    validate_commit_id, validate_commit_message, validate_path, validate_ref, validate_repo_id,
};
