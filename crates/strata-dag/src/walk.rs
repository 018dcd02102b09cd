//! Ancestor iteration, log pagination and merge-base search.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use strata_store::{RepoOperations, StoreError};
use strata_types::{Address, Commit};

use crate::error::{DagError, DagResult};

fn read_commit(tx: &dyn RepoOperations, address: &Address) -> DagResult<Commit> {
    match tx.read_commit(address) {
        Ok(commit) => Ok(commit),
        Err(StoreError::NotFound) => Err(DagError::CommitNotFound(*address)),
        Err(e) => Err(e.into()),
    }
}

/// Heap item ordered by creation date, ties broken by address, so the walk
/// pops commits newest-first and deterministically.
struct WalkItem {
    date: DateTime<Utc>,
    address: Address,
    commit: Commit,
}

impl WalkItem {
    fn new(commit: Commit) -> Self {
        Self {
            date: commit.creation_date,
            address: commit.address,
            commit,
        }
    }
}

impl PartialEq for WalkItem {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date && self.address == other.address
    }
}

impl Eq for WalkItem {}

impl PartialOrd for WalkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WalkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.address.cmp(&other.address))
    }
}

/// A lazy, finite, non-restartable walk over the ancestors of a commit,
/// the start commit included, in reverse-chronological order.
pub struct CommitWalk<'a> {
    tx: &'a dyn RepoOperations,
    heap: BinaryHeap<WalkItem>,
    seen: HashSet<Address>,
}

impl<'a> CommitWalk<'a> {
    /// Start a walk at `start`. Fails if the start commit is not stored.
    pub fn new(tx: &'a dyn RepoOperations, start: &Address) -> DagResult<Self> {
        let commit = read_commit(tx, start)?;
        let mut heap = BinaryHeap::new();
        let mut seen = HashSet::new();
        seen.insert(*start);
        heap.push(WalkItem::new(commit));
        Ok(Self { tx, heap, seen })
    }
}

impl Iterator for CommitWalk<'_> {
    type Item = DagResult<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.heap.pop()?;
        for parent in &item.commit.parents {
            if !self.seen.insert(*parent) {
                continue;
            }
            match read_commit(self.tx, parent) {
                Ok(commit) => self.heap.push(WalkItem::new(commit)),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(item.commit))
    }
}

/// Page through the ancestors of `from` in reverse-chronological order.
///
/// With `after`, the page starts strictly past that commit address in walk
/// order. Returns at most `amount` commits plus a flag indicating another
/// page exists.
pub fn commit_scan(
    tx: &dyn RepoOperations,
    from: &Address,
    amount: usize,
    after: Option<&Address>,
) -> DagResult<(Vec<Commit>, bool)> {
    let mut walk = CommitWalk::new(tx, from)?;
    if let Some(after) = after {
        for commit in walk.by_ref() {
            if commit?.address == *after {
                break;
            }
        }
    }
    let mut page = Vec::new();
    let mut has_more = false;
    for commit in walk {
        if page.len() == amount {
            has_more = true;
            break;
        }
        page.push(commit?);
    }
    Ok((page, has_more))
}

const SIDE_A: u8 = 0b01;
const SIDE_B: u8 = 0b10;

/// Find the lowest common ancestor of two commits: a commit reachable from
/// both by parent links such that no descendant of it is also a common
/// ancestor. Returns `None` for disjoint histories.
///
/// The search interleaves the two ancestor frontiers newest-first, tagging
/// every discovered commit with the side(s) that reached it; the first
/// commit popped with both tags is the merge base.
pub fn find_lowest_common_ancestor(
    tx: &dyn RepoOperations,
    a: &Address,
    b: &Address,
) -> DagResult<Option<Commit>> {
    let commit_a = read_commit(tx, a)?;
    if a == b {
        return Ok(Some(commit_a));
    }
    let commit_b = read_commit(tx, b)?;

    let mut sides: HashMap<Address, u8> = HashMap::new();
    sides.insert(*a, SIDE_A);
    sides.insert(*b, SIDE_B);

    let mut heap = BinaryHeap::new();
    heap.push(WalkItem::new(commit_a));
    heap.push(WalkItem::new(commit_b));

    while let Some(item) = heap.pop() {
        let side = sides.get(&item.address).copied().unwrap_or(0);
        if side == SIDE_A | SIDE_B {
            return Ok(Some(item.commit));
        }
        for parent in &item.commit.parents {
            let tagged = sides.entry(*parent).or_insert(0);
            if (*tagged | side) != *tagged {
                *tagged |= side;
                heap.push(WalkItem::new(read_commit(tx, parent)?));
            }
        }
    }
    Ok(None)
}
