//! Tree construction, path walks and batched updates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use strata_hash::ident;
use strata_store::{RepoOperations, StoreError};
use strata_types::{Address, Entry, EntryKind, Object, Path, Root, TreeNode, WorkspaceEntry};

use crate::error::{MerkleError, MerkleResult};

/// A directory tree rooted at a content address.
///
/// Cheap to construct: the root node is only read when an operation walks
/// the tree. Mutating operations return a new `Merkle`; the original and
/// every node it references remain stored and unchanged.
#[derive(Clone, Debug)]
pub struct Merkle {
    root: Address,
}

/// A single pending change to one directory.
enum Change {
    Put(Entry),
    Drop,
}

impl Merkle {
    /// Wrap an existing root address.
    pub fn new(root: Address) -> Self {
        Self { root }
    }

    /// The address identifying this tree.
    pub fn root(&self) -> Address {
        self.root
    }

    /// Walk `path` and return its entry. The final entry must match `kind`;
    /// a kind mismatch reads as absent.
    pub fn get_entry(
        &self,
        tx: &dyn RepoOperations,
        path: &str,
        kind: EntryKind,
    ) -> MerkleResult<Entry> {
        let parsed = Path::parse(path, kind)?;
        if parsed.is_root() {
            return Err(MerkleError::NotFound(path.to_string()));
        }
        let dir = &parsed.components()[..parsed.depth() - 1];
        let children = self
            .walk_children(tx, dir)?
            .ok_or_else(|| MerkleError::NotFound(path.to_string()))?;
        children
            .iter()
            .find(|e| e.name == parsed.base_name() && e.kind == kind)
            .cloned()
            .ok_or_else(|| MerkleError::NotFound(path.to_string()))
    }

    /// Walk `path` to an object entry and load the object it references.
    pub fn get_object(&self, tx: &dyn RepoOperations, path: &str) -> MerkleResult<Object> {
        let entry = self.get_entry(tx, path, EntryKind::Object)?;
        match tx.read_object(&entry.address) {
            Ok(object) => Ok(object),
            Err(StoreError::NotFound) => Err(MerkleError::MissingObject(entry.address)),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a batch of workspace entries and return the resulting tree.
    ///
    /// Non-tombstone entries insert or overwrite their path; tombstones
    /// remove it. Affected nodes are rebuilt bottom-up with children in
    /// canonical name order, and a directory emptied by deletion collapses
    /// out of its parent. New nodes and the new root record are written
    /// under `repo_id` with timestamp `ts`.
    pub fn update(
        &self,
        tx: &mut dyn RepoOperations,
        repo_id: &str,
        entries: &[WorkspaceEntry],
        ts: DateTime<Utc>,
    ) -> MerkleResult<Merkle> {
        if entries.is_empty() {
            return Ok(self.clone());
        }

        // Bucket changes by containing directory, indexed by directory depth.
        let mut levels: Vec<BTreeMap<Vec<String>, BTreeMap<String, Change>>> = Vec::new();
        for we in entries {
            let path = Path::parse(&we.path, we.entry.kind)?;
            if path.is_root() {
                continue;
            }
            let dir: Vec<String> = path.components()[..path.depth() - 1].to_vec();
            let name = path.base_name().to_string();
            let change = if we.tombstone {
                Change::Drop
            } else {
                Change::Put(Entry {
                    name: name.clone(),
                    ..we.entry.clone()
                })
            };
            level_mut(&mut levels, dir.len())
                .entry(dir)
                .or_default()
                .insert(name, change);
        }

        // Rebuild affected directories deepest-first; every rebuilt node
        // propagates a change into its parent's bucket, so the walk always
        // terminates at the root.
        let mut new_root = self.root;
        for depth in (0..levels.len()).rev() {
            let dirs = std::mem::take(&mut levels[depth]);
            for (dir, changes) in dirs {
                let mut children = self.walk_children(&*tx, &dir)?.unwrap_or_default();
                for (name, change) in changes {
                    match change {
                        Change::Put(entry) => upsert(&mut children, entry),
                        Change::Drop => children.retain(|e| e.name != name),
                    }
                }
                if depth > 0 && children.is_empty() {
                    // An emptied directory collapses into a deletion in its
                    // parent rather than being stored as an empty node.
                    let name = dir[depth - 1].clone();
                    let parent = dir[..depth - 1].to_vec();
                    levels[depth - 1]
                        .entry(parent)
                        .or_default()
                        .insert(name, Change::Drop);
                    continue;
                }
                let address = ident::node_address(&children)?;
                let size: u64 = children.iter().map(|e| e.size).sum();
                tx.write_tree_node(&TreeNode {
                    address,
                    entries: children,
                })?;
                if depth == 0 {
                    new_root = address;
                    tx.write_root(&Root {
                        repository_id: repo_id.to_string(),
                        address,
                        creation_date: ts,
                        size,
                    })?;
                } else {
                    let name = dir[depth - 1].clone();
                    let parent = dir[..depth - 1].to_vec();
                    levels[depth - 1].entry(parent).or_default().insert(
                        name.clone(),
                        Change::Put(Entry {
                            name,
                            address,
                            kind: EntryKind::Tree,
                            creation_date: ts,
                            size,
                            checksum: String::new(),
                        }),
                    );
                }
            }
        }

        debug!(root = %new_root.short_hex(), entries = entries.len(), "tree updated");
        Ok(Merkle::new(new_root))
    }

    /// Walk to the node of a directory given as path segments. `Ok(None)`
    /// means the directory does not exist in this tree; a dangling node
    /// reference is an error.
    pub(crate) fn walk_children(
        &self,
        tx: &dyn RepoOperations,
        dir: &[String],
    ) -> MerkleResult<Option<Vec<Entry>>> {
        let mut node = match tx.read_tree_node(&self.root) {
            Ok(node) => node,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        for segment in dir {
            let Some(entry) = node
                .entries
                .iter()
                .find(|e| e.name == *segment && e.kind == EntryKind::Tree)
            else {
                return Ok(None);
            };
            node = read_node(tx, &entry.address)?;
        }
        Ok(Some(node.entries))
    }
}

/// Read a node that is referenced by a stored entry; absence is corruption.
pub(crate) fn read_node(tx: &dyn RepoOperations, address: &Address) -> MerkleResult<TreeNode> {
    match tx.read_tree_node(address) {
        Ok(node) => Ok(node),
        Err(StoreError::NotFound) => Err(MerkleError::MissingNode(*address)),
        Err(e) => Err(e.into()),
    }
}

fn level_mut(
    levels: &mut Vec<BTreeMap<Vec<String>, BTreeMap<String, Change>>>,
    depth: usize,
) -> &mut BTreeMap<Vec<String>, BTreeMap<String, Change>> {
    if levels.len() <= depth {
        levels.resize_with(depth + 1, BTreeMap::new);
    }
    &mut levels[depth]
}

/// Insert or replace an entry, keeping the child list sorted by name.
fn upsert(children: &mut Vec<Entry>, entry: Entry) {
    match children.binary_search_by(|e| e.name.as_str().cmp(entry.name.as_str())) {
        Ok(i) => children[i] = entry,
        Err(i) => children.insert(i, entry),
    }
}
