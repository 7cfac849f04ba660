//! # Node hashing
//!
//! The digest function is pluggable; everything downstream only relies on
//! it producing a 32-byte [`B256`].

use alloy_primitives::{keccak256, B256};
use alloy_rlp::EMPTY_STRING_CODE;

/// Empty trie root hash (keccak256(RLP("")))
pub const EMPTY_ROOT: B256 = B256::new([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6,
    0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0,
    0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
]);

/// Hash primitive used to address encoded nodes.
pub trait TrieHasher {
    /// Digest of an encoded node
    fn hash(data: &[u8]) -> B256;

    /// Digest of the canonical empty-node encoding
    fn empty_root() -> B256 {
        Self::hash(&[EMPTY_STRING_CODE])
    }
}

/// Ethereum's Keccak-256
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keccak256;

impl TrieHasher for Keccak256 {
    fn hash(data: &[u8]) -> B256 {
        keccak256(data)
    }

    fn empty_root() -> B256 {
        EMPTY_ROOT
    }
}
