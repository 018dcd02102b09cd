//! Address derivation for the addressed record kinds.
//!
//! Every function here hashes a canonical *content view* of the record:
//! the fields that define its identity, excluding the address field itself
//! and excluding anything that may differ between logically equal records
//! (tree node addresses deliberately omit entry timestamps, sizes and
//! checksums so that equal logical contents produce equal addresses).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use strata_types::{Address, Commit, Entry, EntryKind, Object};

use crate::hasher::{ContentHasher, HashResult};

#[derive(Serialize)]
struct CommitContent<'a> {
    tree: &'a Address,
    parents: &'a [Address],
    committer: &'a str,
    message: &'a str,
    creation_date: &'a DateTime<Utc>,
    metadata: &'a BTreeMap<String, String>,
}

/// Content address of a commit, computed over everything but the address
/// field.
pub fn commit_address(commit: &Commit) -> HashResult<Address> {
    ContentHasher::COMMIT.hash_json(&CommitContent {
        tree: &commit.tree,
        parents: &commit.parents,
        committer: &commit.committer,
        message: &commit.message,
        creation_date: &commit.creation_date,
        metadata: &commit.metadata,
    })
}

#[derive(Serialize)]
struct ObjectContent<'a> {
    size: u64,
    checksum: &'a str,
    physical_address: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

/// Content address of an object metadata record.
pub fn object_address(object: &Object) -> HashResult<Address> {
    ContentHasher::OBJECT.hash_json(&ObjectContent {
        size: object.size,
        checksum: &object.checksum,
        physical_address: &object.physical_address,
        metadata: &object.metadata,
    })
}

#[derive(Serialize)]
struct NodeChild<'a> {
    name: &'a str,
    kind: EntryKind,
    address: &'a Address,
}

/// Content address of a tree node, computed over the canonical child list.
///
/// The caller must pass children sorted by name; the address covers each
/// child's name, kind and address only.
pub fn node_address(children: &[Entry]) -> HashResult<Address> {
    let canonical: Vec<NodeChild<'_>> = children
        .iter()
        .map(|e| NodeChild {
            name: &e.name,
            kind: e.kind,
            address: &e.address,
        })
        .collect();
    ContentHasher::NODE.hash_json(&canonical)
}

/// The well-known address of the empty tree.
pub fn empty_tree() -> Address {
    // The canonical encoding of an empty child list is exactly `[]`.
    ContentHasher::NODE.hash(b"[]")
}

/// Returns `true` iff `s` has the shape of a content address: 64 lowercase
/// hex characters. This is how reference resolution decides whether to try
/// a direct commit lookup before falling back to a branch lookup.
pub fn is_hash(s: &str) -> bool {
    s.len() == 64
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn entry(name: &str, seed: u8, kind: EntryKind) -> Entry {
        Entry {
            name: name.into(),
            address: Address::from_digest([seed; 32]),
            kind,
            creation_date: ts(),
            size: 10,
            checksum: "c".into(),
        }
    }

    fn commit(message: &str) -> Commit {
        Commit {
            address: Address::null(),
            tree: Address::from_digest([1; 32]),
            parents: vec![Address::from_digest([2; 32])],
            committer: "alice".into(),
            message: message.into(),
            creation_date: ts(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn commit_address_ignores_assigned_address() {
        let mut a = commit("m");
        let mut b = commit("m");
        a.address = Address::from_digest([9; 32]);
        b.address = Address::from_digest([7; 32]);
        assert_eq!(commit_address(&a).unwrap(), commit_address(&b).unwrap());
    }

    #[test]
    fn commit_address_covers_all_content_fields() {
        let base = commit("m");
        let mut other = commit("m2");
        assert_ne!(commit_address(&base).unwrap(), commit_address(&other).unwrap());
        other = commit("m");
        other.parents.push(Address::from_digest([3; 32]));
        assert_ne!(commit_address(&base).unwrap(), commit_address(&other).unwrap());
        other = commit("m");
        other.metadata.insert("k".into(), "v".into());
        assert_ne!(commit_address(&base).unwrap(), commit_address(&other).unwrap());
    }

    #[test]
    fn node_address_is_order_and_content_sensitive() {
        let a = [entry("a", 1, EntryKind::Object), entry("b", 2, EntryKind::Object)];
        let b = [entry("b", 2, EntryKind::Object), entry("a", 1, EntryKind::Object)];
        assert_ne!(node_address(&a).unwrap(), node_address(&b).unwrap());

        let c = [entry("a", 1, EntryKind::Object), entry("b", 3, EntryKind::Object)];
        assert_ne!(node_address(&a).unwrap(), node_address(&c).unwrap());
    }

    #[test]
    fn node_address_ignores_entry_timestamps() {
        let mut a = entry("a", 1, EntryKind::Object);
        let mut b = a.clone();
        a.creation_date = ts();
        b.creation_date = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        b.size = 999;
        b.checksum = "different".into();
        assert_eq!(node_address(&[a]).unwrap(), node_address(&[b]).unwrap());
    }

    #[test]
    fn empty_tree_matches_empty_child_list() {
        assert_eq!(empty_tree(), node_address(&[]).unwrap());
    }

    #[test]
    fn object_address_is_deterministic() {
        let obj = Object {
            size: 3,
            checksum: "c1".into(),
            physical_address: "p1".into(),
            metadata: BTreeMap::new(),
        };
        assert_eq!(object_address(&obj).unwrap(), object_address(&obj).unwrap());
    }

    #[test]
    fn is_hash_accepts_addresses() {
        let addr = Address::from_digest([0xcd; 32]);
        assert!(is_hash(&addr.to_hex()));
        assert!(is_hash(&empty_tree().to_hex()));
    }

    #[test]
    fn is_hash_rejects_other_shapes() {
        assert!(!is_hash(""));
        assert!(!is_hash("master"));
        assert!(!is_hash(&"a".repeat(63)));
        assert!(!is_hash(&"g".repeat(64)));
        assert!(!is_hash(&"A".repeat(64)));
    }
}
