//! Core record types for the strata metadata index.
//!
//! Everything persisted by the index is described here: repositories,
//! branches, commits, tree roots, tree nodes, directory entries, object
//! metadata records, and the per-branch workspace entries that stage
//! uncommitted changes. The crate also provides the content address type
//! and the slash-delimited path model the tree engine operates on.

pub mod address;
pub mod error;
pub mod model;
pub mod path;

pub use address::Address;
pub use error::{AddressError, PathError};
pub use model::{
    Branch, Commit, DedupEntry, Entry, EntryKind, MultipartUpload, Object, Repo, Root, TreeNode,
    WorkspaceEntry,
};
pub use path::Path;
