//! Persisted record shapes.
//!
//! All records are plain data with serde derives; the store persists them
//! as-is and the identity layer hashes canonical views of them. Addressed
//! records (commits, tree nodes, objects, roots) are immutable once
//! written; branches and workspace entries are the only mutable state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// A repository: the unit of isolation for all index operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: String,
    /// Namespace in blob storage where this repo's object bodies live.
    pub storage_namespace: String,
    pub creation_date: DateTime<Utc>,
    pub default_branch: String,
}

/// A branch: a mutable named pointer into the commit DAG.
///
/// `commit_root` mirrors the tree of the commit `commit_id` points at;
/// `workspace_root` additionally reflects staged changes that partial
/// commits have folded into the tree. After a commit or reset the two are
/// equal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub repository_id: String,
    pub commit_id: Address,
    pub commit_root: Address,
    pub workspace_root: Address,
}

/// An immutable commit. `address` is the content address of the remaining
/// fields and is assigned exactly once, before the commit is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub address: Address,
    /// Root tree node of the snapshot.
    pub tree: Address,
    /// Parent commit addresses, ordered.
    pub parents: Vec<Address>,
    pub committer: String,
    pub message: String,
    pub creation_date: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

/// Addressable header for a directory tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub repository_id: String,
    pub address: Address,
    pub creation_date: DateTime<Utc>,
    /// Total size of all objects reachable from this root.
    pub size: u64,
}

/// The kind of entry a directory holds: an object or a sub-tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Object,
    Tree,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Tree => write!(f, "tree"),
        }
    }
}

/// One element of a directory listing.
///
/// For object entries `address` refers to a stored [`Object`]; for tree
/// entries it refers to a [`TreeNode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub address: Address,
    pub kind: EntryKind,
    pub creation_date: DateTime<Utc>,
    pub size: u64,
    pub checksum: String,
}

/// An addressable directory: its children, sorted by name.
///
/// The address is the content hash of the canonical `(name, kind, address)`
/// child list, so logically equal directories share an address regardless
/// of when their entries were written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub address: Address,
    pub entries: Vec<Entry>,
}

/// Metadata record for a stored blob. The blob bytes themselves live in
/// external storage under `physical_address`; the index never touches them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub size: u64,
    pub checksum: String,
    pub physical_address: String,
    pub metadata: BTreeMap<String, String>,
}

/// A staged, uncommitted change on a branch, keyed by `(branch_id, path)`.
///
/// A tombstone marks the path as deleted relative to the committed tree;
/// the embedded entry of a tombstone carries the name and kind but its
/// remaining fields are not authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub repository_id: String,
    pub branch_id: String,
    pub parent_path: String,
    pub path: String,
    pub entry: Entry,
    pub tombstone: bool,
}

/// Maps a client-computed dedup id to the physical address first seen for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupEntry {
    pub repository_id: String,
    pub dedup_id: String,
    pub physical_address: String,
}

/// Bookkeeping record for an in-flight multipart upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub repository_id: String,
    pub upload_id: String,
    pub path: String,
    pub physical_address: String,
    pub creation_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn entry_kind_display() {
        assert_eq!(EntryKind::Object.to_string(), "object");
        assert_eq!(EntryKind::Tree.to_string(), "tree");
    }

    #[test]
    fn commit_serde_roundtrip() {
        let commit = Commit {
            address: Address::from_digest([1; 32]),
            tree: Address::from_digest([2; 32]),
            parents: vec![Address::from_digest([3; 32])],
            committer: "alice".into(),
            message: "first".into(),
            creation_date: ts(),
            metadata: BTreeMap::from([("k".to_string(), "v".to_string())]),
        };
        let json = serde_json::to_string(&commit).unwrap();
        let parsed: Commit = serde_json::from_str(&json).unwrap();
        assert_eq!(commit, parsed);
    }

    #[test]
    fn workspace_entry_serde_roundtrip() {
        let we = WorkspaceEntry {
            repository_id: "repo".into(),
            branch_id: "master".into(),
            parent_path: "a/".into(),
            path: "a/b.txt".into(),
            entry: Entry {
                name: "b.txt".into(),
                address: Address::from_digest([9; 32]),
                kind: EntryKind::Object,
                creation_date: ts(),
                size: 3,
                checksum: "c1".into(),
            },
            tombstone: false,
        };
        let json = serde_json::to_string(&we).unwrap();
        let parsed: WorkspaceEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(we, parsed);
    }

    #[test]
    fn metadata_map_is_order_stable() {
        let mut a = BTreeMap::new();
        a.insert("z".to_string(), "1".to_string());
        a.insert("a".to_string(), "2".to_string());
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "2".to_string());
        b.insert("z".to_string(), "1".to_string());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
