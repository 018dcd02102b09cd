//! The index façade: every public operation of the metadata index.
//!
//! Operations validate their inputs, then run inside a per-repository
//! transaction (read-only where no writes can occur). Writes stage into
//! the branch workspace; a probabilistic partial commit folds staged
//! entries into the branch's workspace tree so that explicit commits stay
//! cheap.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use strata_dag as dag;
use strata_hash::ident;
use strata_merkle::{DifferenceDirection, DifferenceType, Differences, Merkle};
use strata_store::{ClientOperations, RepoOperations, Store, StoreError, TxMode};
use strata_types::{
    Address, Branch, Commit, DedupEntry, Entry, EntryKind, MultipartUpload, Object, Path, Repo,
    Root, TreeNode, WorkspaceEntry,
};

use crate::error::{IndexError, IndexResult};
use crate::reference::resolve_ref;
use crate::validate::{self, parse_commit_address};

/// The branch created automatically when a repository is born.
pub const DEFAULT_BRANCH: &str = "master";

/// The default probability that a single workspace write triggers a
/// partial commit.
pub const DEFAULT_PARTIAL_COMMIT_RATIO: f64 = 0.01;

/// Injected time source; stamped once per operation that records time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The versioned metadata index.
///
/// Construct with [`Index::new`] and adjust with the builder methods:
///
/// ```ignore
/// let index = Index::new(store)
///     .with_partial_commit_ratio(0.0)
///     .with_clock(fixed_clock);
/// ```
pub struct Index {
    store: Arc<dyn Store>,
    clock: Clock,
    partial_commit_ratio: f64,
    rng: Mutex<StdRng>,
}

impl Index {
    /// Create an index over the given store with default settings.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let index = Self {
            store,
            clock: Arc::new(Utc::now),
            partial_commit_ratio: DEFAULT_PARTIAL_COMMIT_RATIO,
            rng: Mutex::new(StdRng::from_entropy()),
        };
        info!(
            partial_commit_ratio = index.partial_commit_ratio,
            "metadata index initialized"
        );
        index
    }

    /// Replace the time source. Used by tests to pin timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Set the partial-commit probability. `0.0` disables background
    /// flushing entirely, `1.0` flushes on every write.
    pub fn with_partial_commit_ratio(mut self, ratio: f64) -> Self {
        self.partial_commit_ratio = ratio;
        self
    }

    /// Seed the partial-commit decision source deterministically.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    // -----------------------------------------------------------------
    // Transaction plumbing
    // -----------------------------------------------------------------

    fn repo_transact<T>(
        &self,
        repo_id: &str,
        mode: TxMode,
        body: impl FnOnce(&mut dyn RepoOperations) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let mut tx = self.store.begin_repo(repo_id, mode)?;
        match body(tx.ops()) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            // Dropping the transaction rolls back everything it wrote.
            Err(e) => Err(e),
        }
    }

    fn client_transact<T>(
        &self,
        mode: TxMode,
        body: impl FnOnce(&mut dyn ClientOperations) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let mut tx = self.store.begin(mode)?;
        match body(tx.ops()) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------
    // Workspace overlay
    // -----------------------------------------------------------------

    fn should_partially_commit(&self, _repo: &Repo) -> bool {
        let chosen: f64 = self.rng.lock().gen();
        chosen < self.partial_commit_ratio
    }

    /// Stage a workspace entry, occasionally folding the whole workspace
    /// into the branch tree.
    fn write_entry_to_workspace(
        &self,
        tx: &mut dyn RepoOperations,
        repo: &Repo,
        branch: &str,
        entry: WorkspaceEntry,
        ts: DateTime<Utc>,
    ) -> IndexResult<()> {
        tx.write_to_workspace(&entry)?;
        if self.should_partially_commit(repo) {
            self.partial_commit(tx, branch, ts)?;
        }
        Ok(())
    }

    /// Fold all staged workspace entries of `branch` into its tree,
    /// rebasing `workspace_root`; `commit_root` and the head commit stay
    /// untouched. Idempotent: with nothing staged this is a no-op.
    fn partial_commit(
        &self,
        tx: &mut dyn RepoOperations,
        branch: &str,
        ts: DateTime<Utc>,
    ) -> IndexResult<()> {
        tx.lock_workspace(branch)?;
        let entries = tx.list_workspace(branch)?;
        if entries.is_empty() {
            return Ok(());
        }
        let branch_data = match tx.read_branch(branch) {
            Ok(branch_data) => branch_data,
            // A concurrent branch deletion wins; this must not surface.
            Err(StoreError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let tree = Merkle::new(branch_data.workspace_root);
        let tree = tree.update(tx, &branch_data.repository_id, &entries, ts)?;
        tx.clear_workspace(branch)?;
        tx.write_branch(&Branch {
            workspace_root: tree.root(),
            ..branch_data
        })?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// Read the object at `path` as seen from `reference`. On a branch
    /// with `read_uncommitted`, staged changes overlay the tree and a
    /// tombstone reads as absent.
    pub fn read_object(
        &self,
        repo_id: &str,
        reference: &str,
        path: &str,
        read_uncommitted: bool,
    ) -> IndexResult<Object> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(reference)?;
        validate::validate_path(path)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            tx.read_repo()?;
            let resolved = resolve_ref(&*tx, reference)?;
            if let (Some(branch), true) = (resolved.branch(), read_uncommitted) {
                match tx.read_from_workspace(&branch.id, path) {
                    Ok(staged) => {
                        if staged.tombstone {
                            return Err(IndexError::NotFound);
                        }
                        return Ok(tx.read_object(&staged.entry.address)?);
                    }
                    Err(StoreError::NotFound) => {
                        let tree = Merkle::new(branch.workspace_root);
                        return Ok(tree.get_object(&*tx, path)?);
                    }
                    Err(e) => {
                        error!(branch = %branch.id, error = %e, "could not read from workspace");
                        return Err(e.into());
                    }
                }
            }
            let tree = Merkle::new(resolved.commit().tree);
            Ok(tree.get_object(&*tx, path)?)
        })
    }

    fn read_entry_inner(
        &self,
        tx: &mut dyn RepoOperations,
        reference: &str,
        path: &str,
        kind: EntryKind,
        read_uncommitted: bool,
    ) -> IndexResult<Entry> {
        tx.read_repo()?;
        let resolved = resolve_ref(&*tx, reference)?;
        let mut root = resolved.commit().tree;
        if let (Some(branch), true) = (resolved.branch(), read_uncommitted) {
            match tx.read_from_workspace(&branch.id, path) {
                Ok(staged) => {
                    if staged.tombstone {
                        return Err(IndexError::NotFound);
                    }
                    return Ok(staged.entry);
                }
                Err(StoreError::NotFound) => root = branch.workspace_root,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Merkle::new(root).get_entry(&*tx, path, kind)?)
    }

    /// Read the directory entry for an object at `path`.
    pub fn read_entry_object(
        &self,
        repo_id: &str,
        reference: &str,
        path: &str,
        read_uncommitted: bool,
    ) -> IndexResult<Entry> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(reference)?;
        validate::validate_path(path)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            self.read_entry_inner(tx, reference, path, EntryKind::Object, read_uncommitted)
        })
    }

    /// Read the directory entry for a subtree at `path`.
    pub fn read_entry_tree(
        &self,
        repo_id: &str,
        reference: &str,
        path: &str,
        read_uncommitted: bool,
    ) -> IndexResult<Entry> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(reference)?;
        validate::validate_path(path)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            self.read_entry_inner(tx, reference, path, EntryKind::Tree, read_uncommitted)
        })
    }

    /// Read the root record for the tree `reference` resolves to.
    pub fn read_root_object(
        &self,
        repo_id: &str,
        reference: &str,
        read_uncommitted: bool,
    ) -> IndexResult<Root> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(reference)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            tx.read_repo()?;
            let resolved = resolve_ref(&*tx, reference)?;
            let address = match (resolved.branch(), read_uncommitted) {
                (Some(branch), true) => branch.workspace_root,
                _ => resolved.commit().tree,
            };
            Ok(tx.read_root(&address)?)
        })
    }

    // -----------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------

    /// Persist an object record by its content address and stage it at
    /// `path` on `branch`.
    pub fn write_object(
        &self,
        repo_id: &str,
        branch: &str,
        path: &str,
        object: &Object,
    ) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_path(path)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            let address = ident::object_address(object)?;
            tx.write_object(&address, object)?;
            let repo = tx.read_repo()?;
            let parsed = Path::parse(path, EntryKind::Object)?;
            let entry = WorkspaceEntry {
                repository_id: repo_id.to_string(),
                branch_id: branch.to_string(),
                parent_path: parsed.parent_path(),
                path: path.to_string(),
                entry: Entry {
                    name: parsed.base_name().to_string(),
                    address,
                    kind: EntryKind::Object,
                    creation_date: ts,
                    size: object.size,
                    checksum: object.checksum.clone(),
                },
                tombstone: false,
            };
            self.write_entry_to_workspace(tx, &repo, branch, entry, ts)
        })
    }

    /// Stage a caller-provided entry without writing an object record,
    /// for bodies that were uploaded out of band.
    pub fn write_entry(
        &self,
        repo_id: &str,
        branch: &str,
        path: &str,
        entry: &Entry,
    ) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_path(path)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            let repo = tx.read_repo()?;
            let parsed = Path::parse(path, entry.kind)?;
            let staged = WorkspaceEntry {
                repository_id: repo_id.to_string(),
                branch_id: branch.to_string(),
                parent_path: parsed.parent_path(),
                path: path.to_string(),
                entry: Entry {
                    name: parsed.base_name().to_string(),
                    ..entry.clone()
                },
                tombstone: false,
            };
            self.write_entry_to_workspace(tx, &repo, branch, staged, ts)
        })
    }

    /// Persist an object record and stage its entry in one transaction.
    pub fn write_file(
        &self,
        repo_id: &str,
        branch: &str,
        path: &str,
        entry: &Entry,
        object: &Object,
    ) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_path(path)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            let address = ident::object_address(object)?;
            tx.write_object(&address, object)?;
            let repo = tx.read_repo()?;
            let parsed = Path::parse(path, entry.kind)?;
            let staged = WorkspaceEntry {
                repository_id: repo_id.to_string(),
                branch_id: branch.to_string(),
                parent_path: parsed.parent_path(),
                path: path.to_string(),
                entry: Entry {
                    name: parsed.base_name().to_string(),
                    ..entry.clone()
                },
                tombstone: false,
            };
            self.write_entry_to_workspace(tx, &repo, branch, staged, ts)
        })
    }

    /// Delete the object at `path` on `branch`.
    ///
    /// Five cases: absent everywhere fails; a staged-only entry is
    /// unstaged; a committed-only entry gets a tombstone; both does both;
    /// an existing tombstone fails as already deleted.
    pub fn delete_object(&self, repo_id: &str, branch: &str, path: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_path(path)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            let repo = tx.read_repo()?;
            let staged = match tx.read_from_workspace(branch, path) {
                Ok(entry) => Some(entry),
                Err(StoreError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };
            let branch_data = tx.read_branch(branch)?;
            let tree = Merkle::new(branch_data.workspace_root);
            let tree_entry = match tree.get_entry(&*tx, path, EntryKind::Object) {
                Ok(entry) => Some(entry),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };

            if staged.is_none() && tree_entry.is_none() {
                return Err(IndexError::NotFound);
            }
            if let Some(staged) = staged {
                if staged.tombstone {
                    return Err(IndexError::NotFound);
                }
                tx.delete_workspace_path(branch, path)?;
            }
            if tree_entry.is_some() {
                let parsed = Path::parse(path, EntryKind::Object)?;
                let tombstone = WorkspaceEntry {
                    repository_id: repo_id.to_string(),
                    branch_id: branch.to_string(),
                    parent_path: parsed.parent_path(),
                    path: path.to_string(),
                    entry: Entry {
                        name: parsed.base_name().to_string(),
                        address: Address::null(),
                        kind: EntryKind::Object,
                        creation_date: ts,
                        size: 0,
                        checksum: String::new(),
                    },
                    tombstone: true,
                };
                self.write_entry_to_workspace(tx, &repo, branch, tombstone, ts)?;
            }
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Listings
    // -----------------------------------------------------------------

    /// Page entries under `path`. When reading uncommitted state from a
    /// branch, the workspace is folded into the tree first so the scan
    /// reflects all staged writes.
    #[allow(clippy::too_many_arguments)]
    pub fn list_objects_by_prefix(
        &self,
        repo_id: &str,
        reference: &str,
        path: &str,
        after: &str,
        amount: usize,
        descend: bool,
        read_uncommitted: bool,
    ) -> IndexResult<(Vec<Entry>, bool)> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(reference)?;
        validate::validate_path(path)?;
        let mode = if read_uncommitted {
            TxMode::ReadWrite
        } else {
            TxMode::ReadOnly
        };
        let ts = (self.clock)();
        self.repo_transact(repo_id, mode, |tx| {
            tx.read_repo()?;
            let resolved = resolve_ref(&*tx, reference)?;
            let root = match (resolved.branch(), read_uncommitted) {
                (Some(branch), true) => {
                    // Fold synchronously: the scan traverses the tree
                    // immediately after.
                    self.partial_commit(tx, &branch.id, ts)?;
                    tx.read_branch(&branch.id)?.workspace_root
                }
                _ => resolved.commit().tree,
            };
            let tree = Merkle::new(root);
            Ok(tree.prefix_scan(&*tx, path, after, amount, descend)?)
        })
    }

    /// Page branch records by id prefix.
    pub fn list_branches_by_prefix(
        &self,
        repo_id: &str,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> IndexResult<(Vec<Branch>, bool)> {
        validate::validate_repo_id(repo_id)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            // Reading the repo asserts it exists and puts it into this
            // transaction's conflict range.
            tx.read_repo()?;
            Ok(tx.list_branches(prefix, amount, after)?)
        })
    }

    // -----------------------------------------------------------------
    // Branch lifecycle
    // -----------------------------------------------------------------

    /// Discard all uncommitted changes: clear the workspace and point the
    /// workspace root back at the committed root.
    pub fn reset_branch(&self, repo_id: &str, branch: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            tx.clear_workspace(branch)?;
            let mut branch_data = tx.read_branch(branch)?;
            gc(tx, &branch_data.workspace_root);
            branch_data.workspace_root = branch_data.commit_root;
            tx.write_branch(&branch_data)?;
            Ok(())
        })
    }

    /// Create `branch` pointing at the commit `reference` resolves to.
    pub fn create_branch(
        &self,
        repo_id: &str,
        branch: &str,
        reference: &str,
    ) -> IndexResult<Branch> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_ref(reference)?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            match tx.read_branch(branch) {
                Ok(_) => return Err(IndexError::BranchAlreadyExists(branch.to_string())),
                Err(StoreError::NotFound) => {}
                Err(e) => {
                    error!(branch, error = %e, "could not read branch");
                    return Err(e.into());
                }
            }
            let resolved = resolve_ref(&*tx, reference)?;
            let branch_data = Branch {
                id: branch.to_string(),
                repository_id: repo_id.to_string(),
                commit_id: resolved.commit().address,
                commit_root: resolved.commit().tree,
                workspace_root: resolved.commit().tree,
            };
            tx.write_branch(&branch_data)?;
            Ok(branch_data)
        })
    }

    /// Read a branch record.
    pub fn get_branch(&self, repo_id: &str, branch: &str) -> IndexResult<Branch> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| Ok(tx.read_branch(branch)?))
    }

    /// Delete a branch, discarding its workspace.
    pub fn delete_branch(&self, repo_id: &str, branch: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            let branch_data = tx.read_branch(branch)?;
            tx.clear_workspace(branch)?;
            gc(tx, &branch_data.workspace_root);
            tx.delete_branch(branch)?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------

    /// Snapshot the branch workspace as a new commit.
    pub fn commit(
        &self,
        repo_id: &str,
        branch: &str,
        message: &str,
        committer: &str,
        metadata: BTreeMap<String, String>,
    ) -> IndexResult<Commit> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_commit_message(message)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            self.partial_commit(tx, branch, ts)?;
            let mut branch_data = tx.read_branch(branch)?;
            let parents = vec![branch_data.commit_id];
            commit_branch(tx, &mut branch_data, committer, message, parents, metadata, ts)
        })
    }

    /// Read a commit by id.
    pub fn get_commit(&self, repo_id: &str, commit_id: &str) -> IndexResult<Commit> {
        validate::validate_repo_id(repo_id)?;
        let address = parse_commit_address(commit_id, "commit id")?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| Ok(tx.read_commit(&address)?))
    }

    /// Page the ancestry of `from_commit_id`, newest first.
    pub fn get_commit_log(
        &self,
        repo_id: &str,
        from_commit_id: &str,
        amount: usize,
        after: Option<&str>,
    ) -> IndexResult<(Vec<Commit>, bool)> {
        validate::validate_repo_id(repo_id)?;
        let from = parse_commit_address(from_commit_id, "commit id")?;
        let after = after
            .map(|a| parse_commit_address(a, "after"))
            .transpose()?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            Ok(dag::commit_scan(&*tx, &from, amount, after.as_ref())?)
        })
    }

    // -----------------------------------------------------------------
    // Diff
    // -----------------------------------------------------------------

    /// Diff a branch's uncommitted state against its last commit.
    pub fn diff_workspace(&self, repo_id: &str, branch: &str) -> IndexResult<Differences> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            // Fold first so the diff reflects every staged change.
            self.partial_commit(tx, branch, ts)?;
            let branch_data = tx.read_branch(branch)?;
            Ok(strata_merkle::diff(
                &*tx,
                &Merkle::new(branch_data.workspace_root),
                &Merkle::new(branch_data.commit_root),
                &Merkle::new(branch_data.commit_root),
            )?)
        })
    }

    /// Three-way diff of two refs against their lowest common ancestor.
    pub fn diff(&self, repo_id: &str, left: &str, right: &str) -> IndexResult<Differences> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(left)?;
        validate::validate_ref(right)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            self.do_diff(tx, left, right, false)
        })
    }

    fn do_diff(
        &self,
        tx: &mut dyn RepoOperations,
        left: &str,
        right: &str,
        is_merge: bool,
    ) -> IndexResult<Differences> {
        let left_ref = match resolve_ref(&*tx, left) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(reference = left, error = %e, "could not resolve left ref");
                return Err(IndexError::BranchNotFound(left.to_string()));
            }
        };
        let right_ref = match resolve_ref(&*tx, right) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(reference = right, error = %e, "could not resolve right ref");
                return Err(IndexError::BranchNotFound(right.to_string()));
            }
        };
        let base = match dag::find_lowest_common_ancestor(
            &*tx,
            &left_ref.commit().address,
            &right_ref.commit().address,
        ) {
            Ok(Some(commit)) => commit,
            Ok(None) => return Err(IndexError::NoMergeBase),
            Err(e) => {
                error!(error = %e, "could not find merge base");
                return Err(IndexError::NoMergeBase);
            }
        };
        // During a merge both sides are compared by their committed trees;
        // outside of one, a left-side branch contributes its workspace.
        let left_tree = match (left_ref.branch(), is_merge) {
            (Some(branch), false) => branch.workspace_root,
            _ => left_ref.commit().tree,
        };
        Ok(strata_merkle::diff(
            &*tx,
            &Merkle::new(left_tree),
            &Merkle::new(right_ref.commit().tree),
            &Merkle::new(base.tree),
        )?)
    }

    // -----------------------------------------------------------------
    // Revert
    // -----------------------------------------------------------------

    /// Repoint the branch at `commit_id`, discarding the workspace.
    pub fn revert_commit(&self, repo_id: &str, branch: &str, commit_id: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        let address = parse_commit_address(commit_id, "commit id")?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            tx.clear_workspace(branch)?;
            let commit_data = tx.read_commit(&address)?;
            let mut branch_data = tx.read_branch(branch)?;
            gc(tx, &branch_data.workspace_root);
            branch_data.commit_id = address;
            branch_data.commit_root = commit_data.tree;
            branch_data.workspace_root = commit_data.tree;
            tx.write_branch(&branch_data)?;
            Ok(())
        })
    }

    fn revert(
        &self,
        repo_id: &str,
        branch: &str,
        path: &str,
        kind: EntryKind,
    ) -> IndexResult<()> {
        let parsed = Path::parse(path, kind)?;
        if parsed.is_root() {
            return self.reset_branch(repo_id, branch);
        }
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            self.partial_commit(tx, branch, ts)?;
            let mut branch_data = tx.read_branch(branch)?;
            let workspace_tree = Merkle::new(branch_data.workspace_root);
            let commit_tree = Merkle::new(branch_data.commit_root);
            let staged = match commit_tree.get_entry(&*tx, path, kind) {
                // Present in the commit: restore the committed values.
                Ok(committed) => WorkspaceEntry {
                    repository_id: repo_id.to_string(),
                    branch_id: branch.to_string(),
                    parent_path: parsed.parent_path(),
                    path: path.to_string(),
                    entry: committed,
                    tombstone: false,
                },
                // Absent from the commit: drop whatever the workspace
                // tree holds there.
                Err(e) if e.is_not_found() => {
                    let uncommitted = workspace_tree.get_entry(&*tx, path, kind)?;
                    WorkspaceEntry {
                        repository_id: repo_id.to_string(),
                        branch_id: branch.to_string(),
                        parent_path: parsed.parent_path(),
                        path: path.to_string(),
                        entry: uncommitted,
                        tombstone: true,
                    }
                }
                Err(e) => {
                    error!(branch, path, error = %e, "could not get entry");
                    return Err(e.into());
                }
            };
            let updated = workspace_tree.update(tx, repo_id, &[staged], ts)?;
            branch_data.workspace_root = updated.root();
            tx.write_branch(&branch_data)?;
            Ok(())
        })
    }

    /// Revert a subtree to its committed state. The root path behaves as
    /// [`Index::reset_branch`].
    pub fn revert_path(&self, repo_id: &str, branch: &str, path: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_path(path)?;
        self.revert(repo_id, branch, path, EntryKind::Tree)
    }

    /// Revert a single object to its committed state.
    pub fn revert_object(&self, repo_id: &str, branch: &str, path: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(branch)?;
        validate::validate_path(path)?;
        self.revert(repo_id, branch, path, EntryKind::Object)
    }

    // -----------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------

    /// Merge `source` into `destination`.
    ///
    /// The destination must be fully committed. On conflict the error
    /// carries the collected merge operations so the conflict set can be
    /// presented; on success the applied operations are returned.
    pub fn merge(
        &self,
        repo_id: &str,
        source: &str,
        destination: &str,
        user_id: &str,
    ) -> IndexResult<Differences> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(source)?;
        validate::validate_ref(destination)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            let mut destination_branch = match tx.read_branch(destination) {
                Ok(branch) => branch,
                Err(StoreError::NotFound) => {
                    warn!(branch = destination, "merge destination not found");
                    return Err(IndexError::BranchNotFound(destination.to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            let staged = tx.list_workspace(destination)?;
            if destination_branch.commit_root != destination_branch.workspace_root
                || !staged.is_empty()
            {
                return Err(IndexError::DestinationNotCommitted);
            }

            let differences = self.do_diff(tx, source, destination, true)?;
            let mut conflicted = false;
            let mut operations: Differences = Vec::new();
            for difference in differences {
                if difference.direction == DifferenceDirection::Conflict {
                    conflicted = true;
                }
                if difference.direction != DifferenceDirection::Right {
                    operations.push(difference);
                }
            }
            if conflicted {
                return Err(IndexError::MergeConflict { operations });
            }

            let source_branch = match tx.read_branch(source) {
                Ok(branch) => branch,
                Err(StoreError::NotFound) => {
                    return Err(IndexError::BranchNotFound(source.to_string()))
                }
                Err(e) => return Err(e.into()),
            };
            let source_tree = Merkle::new(source_branch.workspace_root);
            let mut entries = Vec::with_capacity(operations.len());
            for operation in &operations {
                let parsed = Path::parse(&operation.path, operation.kind)?;
                let entry = if operation.diff_type == DifferenceType::Removed {
                    Entry {
                        name: parsed.base_name().to_string(),
                        address: Address::null(),
                        kind: operation.kind,
                        creation_date: ts,
                        size: 0,
                        checksum: String::new(),
                    }
                } else {
                    source_tree.get_entry(&*tx, &operation.path, operation.kind)?
                };
                entries.push(WorkspaceEntry {
                    repository_id: repo_id.to_string(),
                    branch_id: destination.to_string(),
                    parent_path: parsed.parent_path(),
                    path: operation.path.clone(),
                    entry,
                    tombstone: operation.diff_type == DifferenceType::Removed,
                });
            }

            let destination_tree = Merkle::new(destination_branch.commit_root);
            let new_root = match destination_tree.update(tx, repo_id, &entries, ts) {
                Ok(tree) => tree.root(),
                Err(e) => {
                    error!(error = %e, "failed updating merge destination");
                    return Err(IndexError::MergeUpdateFailed);
                }
            };
            destination_branch.commit_root = new_root;
            destination_branch.workspace_root = new_root;

            // Parent order depends on ancestry: a destination head that is
            // already an ancestor of the source head sorts after it.
            let source_head = source_branch.commit_id;
            let destination_head = destination_branch.commit_id;
            let destination_is_ancestor = {
                let mut found = false;
                let walk = dag::CommitWalk::new(&*tx, &source_head)?;
                for commit in walk {
                    if commit?.address == destination_head {
                        found = true;
                        break;
                    }
                }
                found
            };
            let parents = if destination_is_ancestor {
                vec![source_head, destination_head]
            } else {
                vec![destination_head, source_head]
            };

            let message = format!("Merge branch {source} into {destination}");
            commit_branch(
                tx,
                &mut destination_branch,
                user_id,
                &message,
                parents,
                BTreeMap::new(),
                ts,
            )?;
            Ok(operations)
        })
    }

    // -----------------------------------------------------------------
    // Repository lifecycle
    // -----------------------------------------------------------------

    /// Create a repository together with its empty root tree, an initial
    /// empty commit, and the default branch, atomically.
    pub fn create_repo(
        &self,
        repo_id: &str,
        storage_namespace: &str,
        default_branch: &str,
    ) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        validate::validate_ref(default_branch)?;
        let ts = (self.clock)();
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            match tx.read_repo() {
                Ok(_) => return Err(IndexError::RepoAlreadyExists(repo_id.to_string())),
                Err(StoreError::NotFound) => {}
                Err(e) => {
                    error!(repo = repo_id, error = %e, "could not read repo");
                    return Err(e.into());
                }
            }
            tx.write_repo(&Repo {
                id: repo_id.to_string(),
                storage_namespace: storage_namespace.to_string(),
                creation_date: ts,
                default_branch: default_branch.to_string(),
            })?;

            let empty = ident::empty_tree();
            tx.write_tree_node(&TreeNode {
                address: empty,
                entries: vec![],
            })?;
            tx.write_root(&Root {
                repository_id: repo_id.to_string(),
                address: empty,
                creation_date: ts,
                size: 0,
            })?;

            let mut commit = Commit {
                address: Address::null(),
                tree: empty,
                parents: vec![],
                committer: String::new(),
                message: String::new(),
                creation_date: ts,
                metadata: BTreeMap::new(),
            };
            commit.address = ident::commit_address(&commit)?;
            tx.write_commit(&commit)?;

            tx.write_branch(&Branch {
                id: default_branch.to_string(),
                repository_id: repo_id.to_string(),
                commit_id: commit.address,
                commit_root: commit.tree,
                workspace_root: commit.tree,
            })?;
            Ok(())
        })
    }

    /// Page all repositories.
    pub fn list_repos(&self, amount: usize, after: Option<&str>) -> IndexResult<(Vec<Repo>, bool)> {
        self.client_transact(TxMode::ReadOnly, |tx| Ok(tx.list_repos(amount, after)?))
    }

    /// Read a repository record.
    pub fn get_repo(&self, repo_id: &str) -> IndexResult<Repo> {
        validate::validate_repo_id(repo_id)?;
        self.client_transact(TxMode::ReadOnly, |tx| Ok(tx.read_repo(repo_id)?))
    }

    /// Delete a repository and everything in it.
    pub fn delete_repo(&self, repo_id: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        self.client_transact(TxMode::ReadWrite, |tx| {
            tx.read_repo(repo_id)?;
            tx.delete_repo(repo_id)?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Dedup and multipart bookkeeping
    // -----------------------------------------------------------------

    /// Record a dedup mapping unless one already exists; returns the
    /// physical address to use. A store failure returns the error alone,
    /// with no address.
    pub fn create_dedup_entry_if_none(
        &self,
        repo_id: &str,
        dedup_id: &str,
        physical_address: &str,
    ) -> IndexResult<String> {
        validate::validate_repo_id(repo_id)?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            match tx.read_dedup(dedup_id) {
                Ok(existing) => Ok(existing.physical_address),
                Err(StoreError::NotFound) => {
                    tx.write_dedup(&DedupEntry {
                        repository_id: repo_id.to_string(),
                        dedup_id: dedup_id.to_string(),
                        physical_address: physical_address.to_string(),
                    })?;
                    Ok(physical_address.to_string())
                }
                Err(e) => {
                    error!(dedup_id, error = %e, "error reading dedup record");
                    Err(e.into())
                }
            }
        })
    }

    /// Record an in-flight multipart upload.
    pub fn create_multipart_upload(
        &self,
        repo_id: &str,
        upload_id: &str,
        path: &str,
        physical_address: &str,
        creation_date: DateTime<Utc>,
    ) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            tx.write_multipart_upload(&MultipartUpload {
                repository_id: repo_id.to_string(),
                upload_id: upload_id.to_string(),
                path: path.to_string(),
                physical_address: physical_address.to_string(),
                creation_date,
            })?;
            Ok(())
        })
    }

    /// Read a multipart upload record.
    pub fn read_multipart_upload(
        &self,
        repo_id: &str,
        upload_id: &str,
    ) -> IndexResult<MultipartUpload> {
        validate::validate_repo_id(repo_id)?;
        self.repo_transact(repo_id, TxMode::ReadOnly, |tx| {
            Ok(tx.read_multipart_upload(upload_id)?)
        })
    }

    /// Drop a multipart upload record.
    pub fn delete_multipart_upload(&self, repo_id: &str, upload_id: &str) -> IndexResult<()> {
        validate::validate_repo_id(repo_id)?;
        self.repo_transact(repo_id, TxMode::ReadWrite, |tx| {
            tx.delete_multipart_upload(upload_id)?;
            Ok(())
        })
    }
}

/// Write a commit snapshotting `branch.workspace_root` and repoint the
/// branch at it, leaving the branch clean.
fn commit_branch(
    tx: &mut dyn RepoOperations,
    branch: &mut Branch,
    committer: &str,
    message: &str,
    parents: Vec<Address>,
    metadata: BTreeMap<String, String>,
    ts: DateTime<Utc>,
) -> IndexResult<Commit> {
    let mut commit = Commit {
        address: Address::null(),
        tree: branch.workspace_root,
        parents,
        committer: committer.to_string(),
        message: message.to_string(),
        creation_date: ts,
        metadata,
    };
    commit.address = ident::commit_address(&commit)?;
    tx.write_commit(&commit)?;
    branch.commit_id = commit.address;
    branch.commit_root = commit.tree;
    branch.workspace_root = commit.tree;
    tx.write_branch(branch)?;
    Ok(commit)
}

/// Hook for collecting tree nodes that become unreachable when a branch
/// root is abandoned. Intentionally not implemented.
fn gc(_tx: &mut dyn RepoOperations, _root: &Address) {}
