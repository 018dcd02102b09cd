//! In-memory store backend.
//!
//! Intended for tests and embedding. Each repository's records live in one
//! [`RepoState`] behind its own mutex; holding the mutex for the lifetime
//! of a transaction gives the serializable per-repository isolation the
//! [`Store`] contract requires, while transactions on different
//! repositories proceed in parallel. A transaction works on a copy of the
//! state and swaps it back in on commit, so dropping a transaction without
//! committing is a true rollback.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock, RwLockWriteGuard};

use strata_types::{
    Address, Branch, Commit, DedupEntry, MultipartUpload, Object, Repo, Root, TreeNode,
    WorkspaceEntry,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    ClientOperations, ClientTransaction, RepoOperations, RepoTransaction, Store, TxMode,
};

/// All records of one repository.
#[derive(Clone, Default)]
struct RepoState {
    repo: Option<Repo>,
    branches: BTreeMap<String, Branch>,
    commits: HashMap<Address, Commit>,
    roots: HashMap<Address, Root>,
    nodes: HashMap<Address, TreeNode>,
    objects: HashMap<Address, Object>,
    /// Staged entries keyed by `(branch, path)`, range-scannable per branch.
    workspace: BTreeMap<(String, String), WorkspaceEntry>,
    dedup: HashMap<String, DedupEntry>,
    multipart: HashMap<String, MultipartUpload>,
}

/// In-memory, per-repository-locked store.
pub struct MemStore {
    repos: RwLock<HashMap<String, Arc<Mutex<RepoState>>>>,
}

impl MemStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore")
            .field("repos", &self.repos.read().len())
            .finish()
    }
}

impl Store for MemStore {
    fn begin_repo(
        &self,
        repo_id: &str,
        mode: TxMode,
    ) -> StoreResult<Box<dyn RepoTransaction + '_>> {
        let cell = {
            let mut map = self.repos.write();
            map.entry(repo_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RepoState::default())))
                .clone()
        };
        // The guard is held for the whole transaction; this is what makes
        // same-repo transactions serializable.
        let guard = cell.lock_arc();
        let working = guard.clone();
        Ok(Box::new(MemRepoTx {
            guard,
            working,
            mode,
            locked_workspaces: HashSet::new(),
        }))
    }

    fn begin(&self, mode: TxMode) -> StoreResult<Box<dyn ClientTransaction + '_>> {
        Ok(Box::new(MemClientTx {
            map: self.repos.write(),
            deleted: HashSet::new(),
            mode,
        }))
    }
}

/// A live transaction over one repository's state.
struct MemRepoTx {
    guard: ArcMutexGuard<RawMutex, RepoState>,
    working: RepoState,
    mode: TxMode,
    /// Branches whose workspace lock was taken. Advisory only: the repo
    /// mutex already serializes everything in this backend.
    locked_workspaces: HashSet<String>,
}

impl MemRepoTx {
    fn writable(&self) -> StoreResult<()> {
        match self.mode {
            TxMode::ReadWrite => Ok(()),
            TxMode::ReadOnly => Err(StoreError::ReadOnly),
        }
    }
}

impl RepoOperations for MemRepoTx {
    fn read_repo(&self) -> StoreResult<Repo> {
        self.working.repo.clone().ok_or(StoreError::NotFound)
    }

    fn write_repo(&mut self, repo: &Repo) -> StoreResult<()> {
        self.writable()?;
        self.working.repo = Some(repo.clone());
        Ok(())
    }

    fn read_branch(&self, branch: &str) -> StoreResult<Branch> {
        self.working
            .branches
            .get(branch)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_branch(&mut self, branch: &Branch) -> StoreResult<()> {
        self.writable()?;
        self.working
            .branches
            .insert(branch.id.clone(), branch.clone());
        Ok(())
    }

    fn delete_branch(&mut self, branch: &str) -> StoreResult<()> {
        self.writable()?;
        self.working
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn list_branches(
        &self,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> StoreResult<(Vec<Branch>, bool)> {
        let lower: Bound<&str> = match after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        let mut page = Vec::new();
        let mut has_more = false;
        for (id, branch) in self.working.branches.range::<str, _>((lower, Bound::Unbounded)) {
            if !id.starts_with(prefix) {
                continue;
            }
            if page.len() == amount {
                has_more = true;
                break;
            }
            page.push(branch.clone());
        }
        Ok((page, has_more))
    }

    fn read_commit(&self, address: &Address) -> StoreResult<Commit> {
        self.working
            .commits
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_commit(&mut self, commit: &Commit) -> StoreResult<()> {
        self.writable()?;
        self.working.commits.insert(commit.address, commit.clone());
        Ok(())
    }

    fn read_root(&self, address: &Address) -> StoreResult<Root> {
        self.working
            .roots
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_root(&mut self, root: &Root) -> StoreResult<()> {
        self.writable()?;
        self.working.roots.insert(root.address, root.clone());
        Ok(())
    }

    fn read_tree_node(&self, address: &Address) -> StoreResult<TreeNode> {
        self.working
            .nodes
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_tree_node(&mut self, node: &TreeNode) -> StoreResult<()> {
        self.writable()?;
        self.working.nodes.insert(node.address, node.clone());
        Ok(())
    }

    fn read_object(&self, address: &Address) -> StoreResult<Object> {
        self.working
            .objects
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_object(&mut self, address: &Address, object: &Object) -> StoreResult<()> {
        self.writable()?;
        self.working.objects.insert(*address, object.clone());
        Ok(())
    }

    fn list_workspace(&self, branch: &str) -> StoreResult<Vec<WorkspaceEntry>> {
        Ok(self
            .working
            .workspace
            .iter()
            .filter(|((b, _), _)| b == branch)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn read_from_workspace(&self, branch: &str, path: &str) -> StoreResult<WorkspaceEntry> {
        self.working
            .workspace
            .get(&(branch.to_string(), path.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_to_workspace(&mut self, entry: &WorkspaceEntry) -> StoreResult<()> {
        self.writable()?;
        self.working.workspace.insert(
            (entry.branch_id.clone(), entry.path.clone()),
            entry.clone(),
        );
        Ok(())
    }

    fn delete_workspace_path(&mut self, branch: &str, path: &str) -> StoreResult<()> {
        self.writable()?;
        self.working
            .workspace
            .remove(&(branch.to_string(), path.to_string()))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn clear_workspace(&mut self, branch: &str) -> StoreResult<()> {
        self.writable()?;
        self.working.workspace.retain(|(b, _), _| b != branch);
        Ok(())
    }

    fn lock_workspace(&mut self, branch: &str) -> StoreResult<()> {
        self.locked_workspaces.insert(branch.to_string());
        Ok(())
    }

    fn read_dedup(&self, dedup_id: &str) -> StoreResult<DedupEntry> {
        self.working
            .dedup
            .get(dedup_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_dedup(&mut self, entry: &DedupEntry) -> StoreResult<()> {
        self.writable()?;
        self.working
            .dedup
            .insert(entry.dedup_id.clone(), entry.clone());
        Ok(())
    }

    fn read_multipart_upload(&self, upload_id: &str) -> StoreResult<MultipartUpload> {
        self.working
            .multipart
            .get(upload_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_multipart_upload(&mut self, upload: &MultipartUpload) -> StoreResult<()> {
        self.writable()?;
        self.working
            .multipart
            .insert(upload.upload_id.clone(), upload.clone());
        Ok(())
    }

    fn delete_multipart_upload(&mut self, upload_id: &str) -> StoreResult<()> {
        self.writable()?;
        self.working
            .multipart
            .remove(upload_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

impl RepoTransaction for MemRepoTx {
    fn ops(&mut self) -> &mut dyn RepoOperations {
        self
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let MemRepoTx {
            mut guard,
            working,
            mode,
            ..
        } = this;
        if mode == TxMode::ReadWrite {
            *guard = working;
        }
        Ok(())
    }
}

/// A live cross-repository transaction. Holds the repository map exclusively,
/// so no per-repo transaction can begin while it is open.
struct MemClientTx<'a> {
    map: RwLockWriteGuard<'a, HashMap<String, Arc<Mutex<RepoState>>>>,
    /// Repo ids staged for deletion; applied on commit.
    deleted: HashSet<String>,
    mode: TxMode,
}

impl ClientOperations for MemClientTx<'_> {
    fn list_repos(&self, amount: usize, after: Option<&str>) -> StoreResult<(Vec<Repo>, bool)> {
        let mut repos: Vec<Repo> = self
            .map
            .iter()
            .filter(|(id, _)| !self.deleted.contains(*id))
            .filter_map(|(_, cell)| cell.lock().repo.clone())
            .collect();
        repos.sort_by(|a, b| a.id.cmp(&b.id));
        let mut page = Vec::new();
        let mut has_more = false;
        for repo in repos {
            if let Some(after) = after {
                if repo.id.as_str() <= after {
                    continue;
                }
            }
            if page.len() == amount {
                has_more = true;
                break;
            }
            page.push(repo);
        }
        Ok((page, has_more))
    }

    fn read_repo(&self, repo_id: &str) -> StoreResult<Repo> {
        if self.deleted.contains(repo_id) {
            return Err(StoreError::NotFound);
        }
        self.map
            .get(repo_id)
            .and_then(|cell| cell.lock().repo.clone())
            .ok_or(StoreError::NotFound)
    }

    fn delete_repo(&mut self, repo_id: &str) -> StoreResult<()> {
        if self.mode == TxMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        let exists = self
            .map
            .get(repo_id)
            .is_some_and(|cell| cell.lock().repo.is_some())
            && !self.deleted.contains(repo_id);
        if !exists {
            return Err(StoreError::NotFound);
        }
        self.deleted.insert(repo_id.to_string());
        Ok(())
    }
}

impl ClientTransaction for MemClientTx<'_> {
    fn ops(&mut self) -> &mut dyn ClientOperations {
        self
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let MemClientTx {
            mut map,
            deleted,
            mode,
        } = this;
        if mode == TxMode::ReadWrite {
            for repo_id in &deleted {
                map.remove(repo_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strata_types::EntryKind;

    fn addr(seed: u8) -> Address {
        Address::from_digest([seed; 32])
    }

    fn repo(id: &str) -> Repo {
        Repo {
            id: id.into(),
            storage_namespace: format!("s3://{id}"),
            creation_date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            default_branch: "master".into(),
        }
    }

    fn branch(id: &str) -> Branch {
        Branch {
            id: id.into(),
            repository_id: "repo".into(),
            commit_id: addr(1),
            commit_root: addr(2),
            workspace_root: addr(2),
        }
    }

    fn ws_entry(branch: &str, path: &str) -> WorkspaceEntry {
        WorkspaceEntry {
            repository_id: "repo".into(),
            branch_id: branch.into(),
            parent_path: "".into(),
            path: path.into(),
            entry: strata_types::Entry {
                name: path.into(),
                address: addr(3),
                kind: EntryKind::Object,
                creation_date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                size: 1,
                checksum: "c".into(),
            },
            tombstone: false,
        }
    }

    // -----------------------------------------------------------------------
    // Commit / rollback
    // -----------------------------------------------------------------------

    #[test]
    fn committed_writes_are_visible() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        tx.write_repo(&repo("repo")).unwrap();
        tx.commit().unwrap();

        let tx = store.begin_repo("repo", TxMode::ReadOnly).unwrap();
        assert_eq!(tx.read_repo().unwrap().id, "repo");
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = MemStore::new();
        {
            let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
            tx.write_repo(&repo("repo")).unwrap();
            // dropped without commit
        }
        let tx = store.begin_repo("repo", TxMode::ReadOnly).unwrap();
        assert_eq!(tx.read_repo(), Err(StoreError::NotFound));
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        tx.write_branch(&branch("master")).unwrap();
        assert_eq!(tx.read_branch("master").unwrap().id, "master");
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadOnly).unwrap();
        assert_eq!(tx.write_repo(&repo("repo")), Err(StoreError::ReadOnly));
    }

    // -----------------------------------------------------------------------
    // Record CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn missing_records_return_not_found() {
        let store = MemStore::new();
        let tx = store.begin_repo("repo", TxMode::ReadOnly).unwrap();
        assert_eq!(tx.read_branch("nope"), Err(StoreError::NotFound));
        assert_eq!(tx.read_commit(&addr(9)), Err(StoreError::NotFound));
        assert_eq!(tx.read_root(&addr(9)), Err(StoreError::NotFound));
        assert_eq!(tx.read_tree_node(&addr(9)), Err(StoreError::NotFound));
        assert_eq!(tx.read_object(&addr(9)), Err(StoreError::NotFound));
        assert_eq!(tx.read_dedup("nope"), Err(StoreError::NotFound));
        assert_eq!(tx.read_multipart_upload("nope"), Err(StoreError::NotFound));
    }

    #[test]
    fn delete_branch_missing_is_not_found() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        assert_eq!(tx.delete_branch("nope"), Err(StoreError::NotFound));
        tx.write_branch(&branch("b")).unwrap();
        tx.delete_branch("b").unwrap();
        assert_eq!(tx.read_branch("b"), Err(StoreError::NotFound));
    }

    // -----------------------------------------------------------------------
    // Branch pagination
    // -----------------------------------------------------------------------

    #[test]
    fn list_branches_pages_in_order() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        for id in ["dev", "feature-a", "feature-b", "master"] {
            tx.write_branch(&branch(id)).unwrap();
        }

        let (page, has_more) = tx.list_branches("", 2, None).unwrap();
        assert_eq!(
            page.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            ["dev", "feature-a"]
        );
        assert!(has_more);

        let (page, has_more) = tx.list_branches("", 2, Some("feature-a")).unwrap();
        assert_eq!(
            page.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            ["feature-b", "master"]
        );
        assert!(!has_more);
    }

    #[test]
    fn list_branches_filters_by_prefix() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        for id in ["dev", "feature-a", "feature-b", "master"] {
            tx.write_branch(&branch(id)).unwrap();
        }
        let (page, has_more) = tx.list_branches("feature-", 10, None).unwrap();
        assert_eq!(page.len(), 2);
        assert!(!has_more);
    }

    // -----------------------------------------------------------------------
    // Workspace
    // -----------------------------------------------------------------------

    #[test]
    fn workspace_is_scoped_per_branch() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        tx.write_to_workspace(&ws_entry("master", "a.txt")).unwrap();
        tx.write_to_workspace(&ws_entry("master", "b.txt")).unwrap();
        tx.write_to_workspace(&ws_entry("dev", "c.txt")).unwrap();

        assert_eq!(tx.list_workspace("master").unwrap().len(), 2);
        assert_eq!(tx.list_workspace("dev").unwrap().len(), 1);

        tx.clear_workspace("master").unwrap();
        assert!(tx.list_workspace("master").unwrap().is_empty());
        assert_eq!(tx.list_workspace("dev").unwrap().len(), 1);
    }

    #[test]
    fn workspace_entries_list_in_path_order() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        for path in ["z.txt", "a.txt", "m/n.txt"] {
            tx.write_to_workspace(&ws_entry("master", path)).unwrap();
        }
        let paths: Vec<String> = tx
            .list_workspace("master")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, ["a.txt", "m/n.txt", "z.txt"]);
    }

    #[test]
    fn workspace_write_overwrites_same_path() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        tx.write_to_workspace(&ws_entry("master", "a.txt")).unwrap();
        let mut tombstone = ws_entry("master", "a.txt");
        tombstone.tombstone = true;
        tx.write_to_workspace(&tombstone).unwrap();

        let read = tx.read_from_workspace("master", "a.txt").unwrap();
        assert!(read.tombstone);
        assert_eq!(tx.list_workspace("master").unwrap().len(), 1);
    }

    #[test]
    fn delete_workspace_path() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        tx.write_to_workspace(&ws_entry("master", "a.txt")).unwrap();
        tx.delete_workspace_path("master", "a.txt").unwrap();
        assert_eq!(
            tx.read_from_workspace("master", "a.txt"),
            Err(StoreError::NotFound)
        );
        assert_eq!(
            tx.delete_workspace_path("master", "a.txt"),
            Err(StoreError::NotFound)
        );
    }

    // -----------------------------------------------------------------------
    // Cross-repo transactions
    // -----------------------------------------------------------------------

    #[test]
    fn list_repos_pages_in_id_order() {
        let store = MemStore::new();
        for id in ["beta", "alpha", "gamma"] {
            let mut tx = store.begin_repo(id, TxMode::ReadWrite).unwrap();
            tx.write_repo(&repo(id)).unwrap();
            tx.commit().unwrap();
        }

        let tx = store.begin(TxMode::ReadOnly).unwrap();
        let (page, has_more) = tx.list_repos(2, None).unwrap();
        assert_eq!(
            page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["alpha", "beta"]
        );
        assert!(has_more);

        let (page, has_more) = tx.list_repos(2, Some("beta")).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "gamma");
        assert!(!has_more);
    }

    #[test]
    fn delete_repo_applies_on_commit() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        tx.write_repo(&repo("repo")).unwrap();
        tx.commit().unwrap();

        {
            let mut tx = store.begin(TxMode::ReadWrite).unwrap();
            tx.delete_repo("repo").unwrap();
            // staged deletion is visible inside the transaction
            assert_eq!(tx.read_repo("repo"), Err(StoreError::NotFound));
            // dropped: rollback
        }
        let tx = store.begin(TxMode::ReadOnly).unwrap();
        assert_eq!(tx.read_repo("repo").unwrap().id, "repo");
        drop(tx);

        let mut tx = store.begin(TxMode::ReadWrite).unwrap();
        tx.delete_repo("repo").unwrap();
        tx.commit().unwrap();

        let tx = store.begin(TxMode::ReadOnly).unwrap();
        assert_eq!(tx.read_repo("repo"), Err(StoreError::NotFound));
    }

    #[test]
    fn delete_repo_missing_is_not_found() {
        let store = MemStore::new();
        let mut tx = store.begin(TxMode::ReadWrite).unwrap();
        assert_eq!(tx.delete_repo("nope"), Err(StoreError::NotFound));
    }

    // -----------------------------------------------------------------------
    // Parallel repositories
    // -----------------------------------------------------------------------

    #[test]
    fn transactions_on_different_repos_are_independent() {
        use std::thread;

        let store = Arc::new(MemStore::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let id = format!("repo-{i}");
                    let mut tx = store.begin_repo(&id, TxMode::ReadWrite).unwrap();
                    tx.write_repo(&repo(&id)).unwrap();
                    tx.commit().unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }

        let tx = store.begin(TxMode::ReadOnly).unwrap();
        let (page, _) = tx.list_repos(10, None).unwrap();
        assert_eq!(page.len(), 4);
    }
}
