//! Slash-delimited paths into a directory tree.
//!
//! Paths come in two flavors mirroring the two entry kinds: object paths
//! never carry a trailing slash, tree paths are normalized to carry one.
//! The empty path is the tree root.

use std::fmt;

use crate::error::PathError;
use crate::model::EntryKind;

/// A parsed path, tagged with the kind of entry it addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
    kind: EntryKind,
}

impl Path {
    /// Parse a path string.
    ///
    /// Object paths must be non-empty and must not end with `/`. Tree paths
    /// may end with `/` (the separator is stripped) and the empty string is
    /// the root. Leading slashes and empty segments are rejected for both
    /// kinds.
    pub fn parse(s: &str, kind: EntryKind) -> Result<Self, PathError> {
        if s.starts_with('/') {
            return Err(PathError::Absolute(s.to_string()));
        }
        let trimmed = match kind {
            EntryKind::Object => {
                if s.is_empty() {
                    return Err(PathError::EmptyObjectPath);
                }
                if s.ends_with('/') {
                    return Err(PathError::TrailingSlash(s.to_string()));
                }
                s
            }
            EntryKind::Tree => s.strip_suffix('/').unwrap_or(s),
        };
        let segments: Vec<String> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').map(str::to_string).collect()
        };
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment(s.to_string()));
        }
        Ok(Self { segments, kind })
    }

    /// The kind of entry this path addresses.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns `true` iff the path has zero segments.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The path segments, in order.
    pub fn components(&self) -> &[String] {
        &self.segments
    }

    /// The last segment, or the empty string for the root.
    pub fn base_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// The path of the containing directory, rendered with a trailing
    /// slash. Top-level paths (and the root itself) yield the empty string.
    pub fn parent_path(&self) -> String {
        if self.segments.len() <= 1 {
            return String::new();
        }
        let mut out = self.segments[..self.segments.len() - 1].join("/");
        out.push('/');
        out
    }

    /// The containing directory as a tree path.
    pub fn parent(&self) -> Path {
        let n = self.segments.len().saturating_sub(1);
        Path {
            segments: self.segments[..n].to_vec(),
            kind: EntryKind::Tree,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))?;
        if self.kind == EntryKind::Tree && !self.segments.is_empty() {
            write!(f, "/")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_object_path() {
        let p = Path::parse("a/b/c.txt", EntryKind::Object).unwrap();
        assert_eq!(p.depth(), 3);
        assert_eq!(p.base_name(), "c.txt");
        assert_eq!(p.parent_path(), "a/b/");
        assert!(!p.is_root());
        assert_eq!(p.to_string(), "a/b/c.txt");
    }

    #[test]
    fn parse_tree_path_normalizes_trailing_slash() {
        let with = Path::parse("a/b/", EntryKind::Tree).unwrap();
        let without = Path::parse("a/b", EntryKind::Tree).unwrap();
        assert_eq!(with, without);
        assert_eq!(with.to_string(), "a/b/");
    }

    #[test]
    fn object_path_rejects_trailing_slash() {
        assert!(matches!(
            Path::parse("a/b/", EntryKind::Object),
            Err(PathError::TrailingSlash(_))
        ));
    }

    #[test]
    fn object_path_rejects_empty() {
        assert!(matches!(
            Path::parse("", EntryKind::Object),
            Err(PathError::EmptyObjectPath)
        ));
    }

    #[test]
    fn empty_tree_path_is_root() {
        let p = Path::parse("", EntryKind::Tree).unwrap();
        assert!(p.is_root());
        assert_eq!(p.base_name(), "");
        assert_eq!(p.parent_path(), "");
        assert_eq!(p.to_string(), "");
    }

    #[test]
    fn top_level_parent_is_empty() {
        let p = Path::parse("file.txt", EntryKind::Object).unwrap();
        assert_eq!(p.parent_path(), "");
        assert!(p.parent().is_root());
    }

    #[test]
    fn rejects_leading_slash() {
        assert!(matches!(
            Path::parse("/a/b", EntryKind::Object),
            Err(PathError::Absolute(_))
        ));
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(matches!(
            Path::parse("a//b", EntryKind::Object),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn parent_of_nested_tree() {
        let p = Path::parse("a/b/c/", EntryKind::Tree).unwrap();
        let parent = p.parent();
        assert_eq!(parent.components(), &["a".to_string(), "b".to_string()]);
        assert_eq!(parent.kind(), EntryKind::Tree);
    }
}
