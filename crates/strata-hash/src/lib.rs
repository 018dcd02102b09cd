//! Content addressing for strata index records.
//!
//! This crate provides:
//! - A domain-separated BLAKE3 hasher over canonical JSON encodings
//! - Address derivation for commits, tree nodes and objects
//! - The well-known empty tree address
//! - The hash-shape test used by reference resolution

pub mod hasher;
pub mod ident;

pub use hasher::{ContentHasher, HashError, HashResult};
pub use ident::{commit_address, empty_tree, is_hash, node_address, object_address};
