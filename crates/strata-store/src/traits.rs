//! The transactional storage interface the index core is written against.
//!
//! Any backend (in-memory, embedded KV, SQL) implements these traits. The
//! contract every implementation must satisfy:
//!
//! - `begin_repo` transactions are serializable within one repository;
//!   transactions on different repositories may proceed in parallel.
//! - A transaction's writes become visible atomically on `commit`;
//!   dropping a transaction without committing discards them (rollback).
//! - `StoreError::NotFound` signals missing keys from every reader.
//! - Content-addressed records (commits, roots, tree nodes, objects) are
//!   keyed by their address; duplicate writes by address are idempotent.
//! - Workspace entries are range-scannable by `(branch, path)`.

use strata_types::{
    Address, Branch, Commit, DedupEntry, MultipartUpload, Object, Repo, Root, TreeNode,
    WorkspaceEntry,
};

use crate::error::StoreResult;

/// Transaction mode hint. Read-only transactions may skip conflict
/// bookkeeping; writes inside one fail with `StoreError::ReadOnly`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxMode {
    ReadWrite,
    ReadOnly,
}

/// Typed record access within a single per-repository transaction.
pub trait RepoOperations {
    /// Read this transaction's repository record.
    fn read_repo(&self) -> StoreResult<Repo>;
    fn write_repo(&mut self, repo: &Repo) -> StoreResult<()>;

    fn read_branch(&self, branch: &str) -> StoreResult<Branch>;
    fn write_branch(&mut self, branch: &Branch) -> StoreResult<()>;
    fn delete_branch(&mut self, branch: &str) -> StoreResult<()>;
    /// Page branches whose id starts with `prefix`, in id order, starting
    /// strictly after `after`. Returns at most `amount` records plus a
    /// flag indicating another page exists.
    fn list_branches(
        &self,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> StoreResult<(Vec<Branch>, bool)>;

    fn read_commit(&self, address: &Address) -> StoreResult<Commit>;
    fn write_commit(&mut self, commit: &Commit) -> StoreResult<()>;

    fn read_root(&self, address: &Address) -> StoreResult<Root>;
    fn write_root(&mut self, root: &Root) -> StoreResult<()>;

    fn read_tree_node(&self, address: &Address) -> StoreResult<TreeNode>;
    fn write_tree_node(&mut self, node: &TreeNode) -> StoreResult<()>;

    fn read_object(&self, address: &Address) -> StoreResult<Object>;
    fn write_object(&mut self, address: &Address, object: &Object) -> StoreResult<()>;

    /// All staged entries of a branch, ordered by path.
    fn list_workspace(&self, branch: &str) -> StoreResult<Vec<WorkspaceEntry>>;
    fn read_from_workspace(&self, branch: &str, path: &str) -> StoreResult<WorkspaceEntry>;
    fn write_to_workspace(&mut self, entry: &WorkspaceEntry) -> StoreResult<()>;
    fn delete_workspace_path(&mut self, branch: &str, path: &str) -> StoreResult<()>;
    fn clear_workspace(&mut self, branch: &str) -> StoreResult<()>;
    /// Advisory per-branch lock taken before a workspace is listed, folded
    /// and cleared as one unit. Backends whose transactions are already
    /// exclusive per repository may record it and do nothing else.
    fn lock_workspace(&mut self, branch: &str) -> StoreResult<()>;

    fn read_dedup(&self, dedup_id: &str) -> StoreResult<DedupEntry>;
    fn write_dedup(&mut self, entry: &DedupEntry) -> StoreResult<()>;

    fn read_multipart_upload(&self, upload_id: &str) -> StoreResult<MultipartUpload>;
    fn write_multipart_upload(&mut self, upload: &MultipartUpload) -> StoreResult<()>;
    fn delete_multipart_upload(&mut self, upload_id: &str) -> StoreResult<()>;
}

/// The cross-repository surface.
pub trait ClientOperations {
    /// Page repositories in id order, starting strictly after `after`.
    fn list_repos(&self, amount: usize, after: Option<&str>) -> StoreResult<(Vec<Repo>, bool)>;
    fn read_repo(&self, repo_id: &str) -> StoreResult<Repo>;
    fn delete_repo(&mut self, repo_id: &str) -> StoreResult<()>;
}

/// A live per-repository transaction. Dropping it without committing rolls
/// back.
pub trait RepoTransaction: RepoOperations {
    /// The operations view of this transaction.
    fn ops(&mut self) -> &mut dyn RepoOperations;
    /// Atomically publish this transaction's writes.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// A live cross-repository transaction. Dropping it without committing
/// rolls back.
pub trait ClientTransaction: ClientOperations {
    /// The operations view of this transaction.
    fn ops(&mut self) -> &mut dyn ClientOperations;
    /// Atomically publish this transaction's writes.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// A transactional record store.
pub trait Store: Send + Sync {
    /// Open a transaction scoped to one repository. Serializable with
    /// respect to all other transactions on the same repository.
    fn begin_repo(&self, repo_id: &str, mode: TxMode) -> StoreResult<Box<dyn RepoTransaction + '_>>;

    /// Open a cross-repository transaction.
    fn begin(&self, mode: TxMode) -> StoreResult<Box<dyn ClientTransaction + '_>>;
}
