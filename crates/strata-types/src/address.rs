use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Content address of a stored record.
///
/// An `Address` is the 32-byte digest of a record's canonical serialization.
/// Records with equal canonical fields always share an address, which makes
/// commits, tree nodes and objects deduplicatable and immutable by
/// construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// Wrap a pre-computed digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// The null address (all zeros). Used where no record is referenced,
    /// e.g. the non-authoritative address field of a tombstone entry.
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the null address.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation (64 lowercase characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(AddressError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Address {
    fn from(digest: [u8; 32]) -> Self {
        Self(digest)
    }
}

impl From<Address> for [u8; 32] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}
