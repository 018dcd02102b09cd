//! Immutable content-addressed directory trees.
//!
//! A tree is identified by the address of its root node; nodes list their
//! children as name-sorted entries. Mutation never happens in place: a
//! batched [`Merkle::update`] rebuilds the affected nodes bottom-up and
//! returns a tree rooted at the new address, leaving every previously
//! stored node untouched.
//!
//! This crate provides:
//! - Path walks: [`Merkle::get_object`] and [`Merkle::get_entry`]
//! - Batched updates with tombstone handling and empty-directory collapse
//! - Paginated [`Merkle::prefix_scan`] in shallow and descending modes
//! - Three-way [`diff`] with left/right/conflict attribution

pub mod diff;
pub mod error;
pub mod scan;
pub mod tree;

pub use diff::{diff, Difference, DifferenceDirection, DifferenceType, Differences};
pub use error::{MerkleError, MerkleResult};
pub use tree::Merkle;
