//! Three-way tree diff.
//!
//! Compares a left and a right tree against a common base, attributing
//! each change to the side that diverged from the base. A path changed
//! incompatibly on both sides is reported as a conflict. Directories
//! changed on both sides are descended so that independent edits to
//! different files inside one directory do not read as conflicts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use strata_store::{RepoOperations, StoreError};
use strata_types::{Address, Entry, EntryKind};

use crate::error::MerkleResult;
use crate::tree::Merkle;

/// What happened to a path, relative to the base tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferenceType {
    Added,
    Removed,
    Changed,
    Conflict,
}

/// Which side a change belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferenceDirection {
    Left,
    Right,
    Conflict,
}

/// One element of a diff result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    pub path: String,
    pub kind: EntryKind,
    pub diff_type: DifferenceType,
    pub direction: DifferenceDirection,
}

pub type Differences = Vec<Difference>;

/// Compute the three-way difference of `left` and `right` against `base`.
pub fn diff(
    tx: &dyn RepoOperations,
    left: &Merkle,
    right: &Merkle,
    base: &Merkle,
) -> MerkleResult<Differences> {
    let l = children_map(tx, Some(left.root()))?;
    let r = children_map(tx, Some(right.root()))?;
    let b = children_map(tx, Some(base.root()))?;
    let mut out = Vec::new();
    diff_maps(tx, &l, &r, &b, "", &mut out)?;
    Ok(out)
}

fn children_map(
    tx: &dyn RepoOperations,
    address: Option<Address>,
) -> MerkleResult<BTreeMap<String, Entry>> {
    let Some(address) = address else {
        return Ok(BTreeMap::new());
    };
    match tx.read_tree_node(&address) {
        Ok(node) => Ok(node
            .entries
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect()),
        Err(StoreError::NotFound) => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Entries are compared by logical identity: address and kind.
fn same(a: Option<&Entry>, b: Option<&Entry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.address == y.address && x.kind == y.kind,
        _ => false,
    }
}

fn is_tree(entry: Option<&Entry>) -> bool {
    entry.is_some_and(|e| e.kind == EntryKind::Tree)
}

fn diff_maps(
    tx: &dyn RepoOperations,
    l: &BTreeMap<String, Entry>,
    r: &BTreeMap<String, Entry>,
    b: &BTreeMap<String, Entry>,
    prefix: &str,
    out: &mut Differences,
) -> MerkleResult<()> {
    let mut names: BTreeSet<&String> = BTreeSet::new();
    names.extend(l.keys());
    names.extend(r.keys());
    names.extend(b.keys());

    for name in names {
        let le = l.get(name);
        let re = r.get(name);
        let be = b.get(name);

        // Identical on both sides: nothing to report, whatever the base says.
        if same(le, re) {
            continue;
        }

        // Both sides hold (differing) subtrees: descend so that edits to
        // different files inside one directory attribute independently.
        if is_tree(le) && is_tree(re) {
            let base_tree = be.filter(|e| e.kind == EntryKind::Tree);
            let lm = children_map(tx, le.map(|e| e.address))?;
            let rm = children_map(tx, re.map(|e| e.address))?;
            let bm = children_map(tx, base_tree.map(|e| e.address))?;
            diff_maps(tx, &lm, &rm, &bm, &format!("{prefix}{name}/"), out)?;
            continue;
        }

        let l_changed = !same(le, be);
        let r_changed = !same(re, be);
        let path = format!("{prefix}{name}");

        if l_changed && r_changed {
            let kind = le.or(re).map(|e| e.kind).unwrap_or(EntryKind::Object);
            out.push(Difference {
                path,
                kind,
                diff_type: DifferenceType::Conflict,
                direction: DifferenceDirection::Conflict,
            });
            continue;
        }

        let (side, direction) = if l_changed {
            (le, DifferenceDirection::Left)
        } else {
            (re, DifferenceDirection::Right)
        };
        let difference = match (side, be) {
            (Some(e), None) => Difference {
                path,
                kind: e.kind,
                diff_type: DifferenceType::Added,
                direction,
            },
            (None, Some(base_entry)) => Difference {
                path,
                kind: base_entry.kind,
                diff_type: DifferenceType::Removed,
                direction,
            },
            (Some(e), Some(_)) => Difference {
                path,
                kind: e.kind,
                diff_type: DifferenceType::Changed,
                direction,
            },
            (None, None) => continue,
        };
        out.push(difference);
    }
    Ok(())
}
