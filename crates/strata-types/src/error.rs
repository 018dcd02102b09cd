/// Errors from parsing or constructing content addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Errors from parsing paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("object path must not end with '/': {0:?}")]
    TrailingSlash(String),

    #[error("object path must not be empty")]
    EmptyObjectPath,

    #[error("path must not start with '/': {0:?}")]
    Absolute(String),

    #[error("path contains an empty segment: {0:?}")]
    EmptySegment(String),
}
