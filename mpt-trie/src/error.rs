//! # Error types for MPT
//!
//! Re-exports mpt-error and adds the codec-level error plus trie-specific
//! constructors.

pub use mpt_error::{Error, ErrorKind, ErrorStatus, Result};

use alloy_primitives::B256;

/// Low-level decoding failures for paths and node encodings.
///
/// Surfaced to callers wrapped in [`Error`] with kind `MalformedPath` for
/// hex-prefix problems and `CorruptNode` for everything else.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("empty hex-prefix path")]
    EmptyPath,

    #[error("invalid hex-prefix flag nibble {0:#x}")]
    InvalidPathFlag(u8),

    #[error("non-zero padding nibble {0:#x} in even-length path")]
    NonZeroPadding(u8),

    #[error("RLP decode error: {0}")]
    Rlp(#[from] alloy_rlp::Error),

    #[error("expected an RLP list")]
    ExpectedList,

    #[error("expected an RLP string")]
    ExpectedString,

    #[error("node list has {0} items, expected 2 or 17")]
    ItemCount(usize),

    #[error("{0} trailing bytes after node")]
    TrailingBytes(usize),

    #[error("child reference of {0} bytes is neither inline nor a digest")]
    InvalidChildRef(usize),

    #[error("extension node with empty path")]
    EmptyExtension,

    #[error("extension node without a child")]
    DanglingExtension,
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::EmptyPath | CodecError::InvalidPathFlag(_) | CodecError::NonZeroPadding(_) => {
                ErrorKind::MalformedPath
            }
            _ => ErrorKind::CorruptNode,
        }
    }

    /// Wrap into the workspace error, keeping self as the source
    pub fn into_error(self, operation: &'static str) -> Error {
        Error::new(self.kind(), self.to_string())
            .with_operation(operation)
            .set_source(self)
    }
}

/// Render a digest the way it appears in messages and exports
pub fn hex_digest(digest: &B256) -> String {
    format!("0x{}", hex::encode(digest))
}

// =============================================================================
// Trie-specific error constructors
// =============================================================================

/// A referenced digest is absent from the store
pub fn missing_node(digest: &B256) -> Error {
    Error::missing_node(hex_digest(digest))
}

/// Stored bytes did not hash to the digest they were stored under
pub fn hash_mismatch(expected: &B256, actual: &B256) -> Error {
    Error::corrupt_node(format!(
        "hash mismatch: expected {}, got {}",
        hex_digest(expected),
        hex_digest(actual)
    ))
    .with_context("expected", hex_digest(expected))
    .with_context("actual", hex_digest(actual))
}

/// A branch with fewer than two children and no value, or with no children
pub fn invalid_branch_shape(children: usize, has_value: bool) -> Error {
    Error::new(
        ErrorKind::InvalidBranchShape,
        format!("branch with {} children (value: {})", children, has_value),
    )
    .with_context("children", children.to_string())
    .with_context("has_value", has_value.to_string())
}

/// The walker reached a digest that is already on its ancestor path
pub fn cyclic_parent(digest: &B256, depth: usize) -> Error {
    Error::new(
        ErrorKind::CyclicParent,
        format!("node {} is its own ancestor", hex_digest(digest)),
    )
    .with_context("digest", hex_digest(digest))
    .with_context("depth", depth.to_string())
}

/// A proof did not authenticate against a root
pub fn invalid_proof(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidProof, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_kinds() {
        assert_eq!(CodecError::EmptyPath.kind(), ErrorKind::MalformedPath);
        assert_eq!(CodecError::NonZeroPadding(1).kind(), ErrorKind::MalformedPath);
        assert_eq!(CodecError::ItemCount(3).kind(), ErrorKind::CorruptNode);
        assert_eq!(CodecError::EmptyExtension.kind(), ErrorKind::CorruptNode);
    }

    #[test]
    fn test_into_error_keeps_source() {
        let err = CodecError::ItemCount(5).into_error("node::decode");
        assert_eq!(err.kind(), ErrorKind::CorruptNode);
        assert_eq!(err.operation(), "node::decode");
        assert!(err.source_ref().is_some());
        assert!(err.message().contains("5 items"));
    }

    #[test]
    fn test_hex_digest() {
        assert_eq!(hex_digest(&B256::ZERO).len(), 66);
        assert!(hex_digest(&B256::ZERO).starts_with("0x00"));
    }
}
