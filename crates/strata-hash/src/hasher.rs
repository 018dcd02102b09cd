use strata_types::Address;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation. This prevents cross-type address collisions: a commit and a
/// tree node with identical canonical bytes produce different addresses.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for commit records.
    pub const COMMIT: Self = Self {
        domain: "strata-commit-v1",
    };
    /// Hasher for tree node records.
    pub const NODE: Self = Self {
        domain: "strata-node-v1",
    };
    /// Hasher for object metadata records.
    pub const OBJECT: Self = Self {
        domain: "strata-object-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw canonical bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Address::from_digest(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value's canonical JSON encoding.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> HashResult<Address> {
        let data =
            serde_json::to_vec(value).map_err(|e| HashError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type HashResult<T> = Result<T, HashError>;
