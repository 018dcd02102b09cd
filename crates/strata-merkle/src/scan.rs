//! Paginated prefix scans over a tree.

use strata_store::RepoOperations;
use strata_types::{Entry, EntryKind, Path};

use crate::error::MerkleResult;
use crate::tree::{read_node, Merkle};

impl Merkle {
    /// List entries under `prefix`, in lexicographic order, starting
    /// strictly after `after`, returning at most `amount` entries plus a
    /// flag indicating another page exists.
    ///
    /// The prefix is split at its last `/` into a containing directory and
    /// a name prefix; `a/fi` scans directory `a/` for names starting with
    /// `fi`, while `a/` scans all of that directory. With `descend` the
    /// scan recurses into subtrees and yields object entries only, named
    /// by their slash-joined path relative to the containing directory;
    /// without it the scan yields the directory's immediate children, both
    /// object and tree entries. `after` is compared in the same relative
    /// name space. A prefix whose directory does not exist yields an empty
    /// page.
    pub fn prefix_scan(
        &self,
        tx: &dyn RepoOperations,
        prefix: &str,
        after: &str,
        amount: usize,
        descend: bool,
    ) -> MerkleResult<(Vec<Entry>, bool)> {
        let (dir_str, name_prefix) = match prefix.rfind('/') {
            Some(i) => prefix.split_at(i + 1),
            None => ("", prefix),
        };
        let dir = Path::parse(dir_str, EntryKind::Tree)?;
        let Some(children) = self.walk_children(tx, dir.components())? else {
            return Ok((Vec::new(), false));
        };

        // Collect one entry past the requested amount to learn whether a
        // further page exists.
        let limit = amount.saturating_add(1);
        let mut found = Vec::new();
        if descend {
            collect_descend(tx, &children, "", name_prefix, after, limit, &mut found)?;
        } else {
            for entry in &children {
                if found.len() == limit {
                    break;
                }
                if entry.name.starts_with(name_prefix) && entry.name.as_str() > after {
                    found.push(entry.clone());
                }
            }
        }

        let has_more = found.len() > amount;
        found.truncate(amount);
        Ok((found, has_more))
    }
}

/// Depth-first walk in name order, yielding object entries renamed to
/// their path relative to the scan root.
fn collect_descend(
    tx: &dyn RepoOperations,
    children: &[Entry],
    rel_dir: &str,
    name_prefix: &str,
    after: &str,
    limit: usize,
    found: &mut Vec<Entry>,
) -> MerkleResult<()> {
    for entry in children {
        if found.len() == limit {
            return Ok(());
        }
        let rel = format!("{rel_dir}{}", entry.name);
        match entry.kind {
            EntryKind::Object => {
                if rel.starts_with(name_prefix) && rel.as_str() > after {
                    found.push(Entry {
                        name: rel,
                        ..entry.clone()
                    });
                }
            }
            EntryKind::Tree => {
                let subtree = format!("{rel}/");
                // Skip subtrees that cannot contain a matching name.
                if !subtree.starts_with(name_prefix) && !name_prefix.starts_with(subtree.as_str()) {
                    continue;
                }
                let node = read_node(tx, &entry.address)?;
                collect_descend(tx, &node.entries, &subtree, name_prefix, after, limit, found)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use strata_hash::ident;
    use strata_store::{MemStore, RepoTransaction, Store, TxMode};
    use strata_types::{Address, TreeNode, WorkspaceEntry};

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn ws(path: &str, seed: u8) -> WorkspaceEntry {
        let parsed = Path::parse(path, EntryKind::Object).unwrap();
        WorkspaceEntry {
            repository_id: "repo".into(),
            branch_id: "master".into(),
            parent_path: parsed.parent_path(),
            path: path.into(),
            entry: Entry {
                name: parsed.base_name().into(),
                address: Address::from_digest([seed; 32]),
                kind: EntryKind::Object,
                creation_date: ts(),
                size: 1,
                checksum: String::new(),
            },
            tombstone: false,
        }
    }

    /// Tree with objects: a.txt, docs/guide.md, docs/index.md, src/main.rs,
    /// src/util/helpers.rs
    fn sample_tree(tx: &mut dyn RepoOperations) -> Merkle {
        let address = ident::empty_tree();
        tx.write_tree_node(&TreeNode {
            address,
            entries: vec![],
        })
        .unwrap();
        Merkle::new(address)
            .update(
                tx,
                "repo",
                &[
                    ws("a.txt", 1),
                    ws("docs/guide.md", 2),
                    ws("docs/index.md", 3),
                    ws("src/main.rs", 4),
                    ws("src/util/helpers.rs", 5),
                ],
                ts(),
            )
            .unwrap()
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    // -----------------------------------------------------------------------
    // Shallow scans
    // -----------------------------------------------------------------------

    #[test]
    fn shallow_scan_lists_immediate_children() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, has_more) = tree.prefix_scan(tx.ops(), "", "", 10, false).unwrap();
        assert_eq!(names(&page), ["a.txt", "docs", "src"]);
        assert!(!has_more);
        assert_eq!(page[1].kind, EntryKind::Tree);
    }

    #[test]
    fn shallow_scan_of_subdirectory() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, has_more) = tree.prefix_scan(tx.ops(), "docs/", "", 10, false).unwrap();
        assert_eq!(names(&page), ["guide.md", "index.md"]);
        assert!(!has_more);
    }

    #[test]
    fn shallow_scan_with_name_prefix() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, _) = tree.prefix_scan(tx.ops(), "docs/g", "", 10, false).unwrap();
        assert_eq!(names(&page), ["guide.md"]);
    }

    // -----------------------------------------------------------------------
    // Descending scans
    // -----------------------------------------------------------------------

    #[test]
    fn descend_yields_objects_with_relative_paths() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, has_more) = tree.prefix_scan(tx.ops(), "", "", 10, true).unwrap();
        assert_eq!(
            names(&page),
            [
                "a.txt",
                "docs/guide.md",
                "docs/index.md",
                "src/main.rs",
                "src/util/helpers.rs"
            ]
        );
        assert!(!has_more);
        assert!(page.iter().all(|e| e.kind == EntryKind::Object));
    }

    #[test]
    fn descend_within_subdirectory() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, _) = tree.prefix_scan(tx.ops(), "src/", "", 10, true).unwrap();
        assert_eq!(names(&page), ["main.rs", "util/helpers.rs"]);
    }

    #[test]
    fn descend_prunes_by_name_prefix() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, _) = tree.prefix_scan(tx.ops(), "do", "", 10, true).unwrap();
        assert_eq!(names(&page), ["docs/guide.md", "docs/index.md"]);
    }

    // -----------------------------------------------------------------------
    // Pagination
    // -----------------------------------------------------------------------

    #[test]
    fn pages_concatenate_to_full_scan() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (full, _) = tree.prefix_scan(tx.ops(), "", "", 100, true).unwrap();

        let mut paged: Vec<Entry> = Vec::new();
        let mut after = String::new();
        loop {
            let (page, has_more) = tree.prefix_scan(tx.ops(), "", &after, 2, true).unwrap();
            assert!(page.len() <= 2);
            paged.extend(page);
            if !has_more {
                break;
            }
            after = paged.last().unwrap().name.clone();
        }
        assert_eq!(names(&paged), names(&full));
    }

    #[test]
    fn has_more_reflects_next_page() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, has_more) = tree.prefix_scan(tx.ops(), "", "", 4, true).unwrap();
        assert_eq!(page.len(), 4);
        assert!(has_more);

        let (page, has_more) = tree
            .prefix_scan(tx.ops(), "", "src/main.rs", 4, true)
            .unwrap();
        assert_eq!(names(&page), ["src/util/helpers.rs"]);
        assert!(!has_more);
    }

    // -----------------------------------------------------------------------
    // Edge cases
    // -----------------------------------------------------------------------

    #[test]
    fn missing_directory_yields_empty_page() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let tree = sample_tree(tx.ops());

        let (page, has_more) = tree.prefix_scan(tx.ops(), "nope/", "", 10, true).unwrap();
        assert!(page.is_empty());
        assert!(!has_more);
    }

    #[test]
    fn empty_tree_scans_empty() {
        let store = MemStore::new();
        let mut tx = store.begin_repo("repo", TxMode::ReadWrite).unwrap();
        let address = ident::empty_tree();
        tx.write_tree_node(&TreeNode {
            address,
            entries: vec![],
        })
        .unwrap();
        let tree = Merkle::new(address);

        let (page, has_more) = tree.prefix_scan(tx.ops(), "", "", 10, false).unwrap();
        assert!(page.is_empty());
        assert!(!has_more);
    }
}
