//! # Nibbles
//!
//! Keys in the MPT are represented as nibbles (half-bytes / 4 bits).
//! This allows branching on 16 possible values at each node.

use crate::error::CodecError;
use serde::{Serialize, Serializer};
use std::fmt;

/// Flag nibble for a leaf path (odd adds 1)
const LEAF_FLAG: u8 = 2;

/// Flag nibble for an extension path (odd adds 1)
const EXTENSION_FLAG: u8 = 0;

/// A sequence of nibbles (4-bit values)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nibbles {
    /// The nibble data, one nibble per byte
    data: Vec<u8>,
}

impl Nibbles {
    /// Create empty nibbles
    pub fn new() -> Self {
        Nibbles { data: Vec::new() }
    }

    /// Create from bytes (each byte becomes 2 nibbles, high then low)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            data.push(byte >> 4);
            data.push(byte & 0x0f);
        }
        Nibbles { data }
    }

    /// Create from raw nibbles
    pub fn from_raw(nibbles: Vec<u8>) -> Self {
        debug_assert!(nibbles.iter().all(|n| *n < 16));
        Nibbles { data: nibbles }
    }

    /// Decode hex-prefix ("compact") encoded bytes.
    ///
    /// The high nibble of the first byte is `2 * is_leaf + odd`; when the
    /// path is even the low nibble is padding and must be zero.
    pub fn expand(encoded: &[u8]) -> Result<(Self, bool), CodecError> {
        let (&first, rest) = encoded.split_first().ok_or(CodecError::EmptyPath)?;
        let flag = first >> 4;
        if flag > 3 {
            return Err(CodecError::InvalidPathFlag(flag));
        }
        let is_leaf = flag & LEAF_FLAG != 0;
        let odd = flag & 1 == 1;

        let mut data = Vec::with_capacity(rest.len() * 2 + 1);
        if odd {
            data.push(first & 0x0f);
        } else if first & 0x0f != 0 {
            return Err(CodecError::NonZeroPadding(first & 0x0f));
        }
        for byte in rest {
            data.push(byte >> 4);
            data.push(byte & 0x0f);
        }

        Ok((Nibbles { data }, is_leaf))
    }

    /// Encode to hex-prefix format
    pub fn compact(&self, is_leaf: bool) -> Vec<u8> {
        let flag = if is_leaf { LEAF_FLAG } else { EXTENSION_FLAG };
        let mut encoded = Vec::with_capacity(self.len() / 2 + 1);

        let rest = if self.len() % 2 == 1 {
            encoded.push((flag + 1) << 4 | self.data[0]);
            &self.data[1..]
        } else {
            encoded.push(flag << 4);
            &self.data[..]
        };
        encoded.extend(rest.chunks_exact(2).map(|pair| pair[0] << 4 | pair[1]));

        encoded
    }

    /// Convert back to bytes (each 2 nibbles -> 1 byte); `None` on odd length
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.data.len() % 2 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(2)
                .map(|pair| pair[0] << 4 | pair[1])
                .collect(),
        )
    }

    /// Get length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get nibble at index
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Get first nibble
    pub fn first(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Get slice from index
    pub fn slice(&self, start: usize) -> Self {
        Nibbles {
            data: self.data[start..].to_vec(),
        }
    }

    /// Get slice range
    pub fn slice_range(&self, start: usize, end: usize) -> Self {
        Nibbles {
            data: self.data[start..end].to_vec(),
        }
    }

    /// Find common prefix length with another nibble sequence
    pub fn common_prefix_len(&self, other: &Nibbles) -> usize {
        self.data
            .iter()
            .zip(other.data.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Whether `prefix` is a prefix of this sequence
    pub fn starts_with(&self, prefix: &Nibbles) -> bool {
        self.data.starts_with(&prefix.data)
    }

    /// Append another nibble sequence
    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(&other.data);
    }

    /// Push a single nibble
    pub fn push(&mut self, nibble: u8) {
        debug_assert!(nibble < 16);
        self.data.push(nibble);
    }

    /// `[nibble] ++ self`, used when collapsing a branch slot into its child
    pub fn with_prefix(&self, nibble: u8) -> Self {
        debug_assert!(nibble < 16);
        let mut data = Vec::with_capacity(self.len() + 1);
        data.push(nibble);
        data.extend_from_slice(&self.data);
        Nibbles { data }
    }

    /// Get as slice
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Default for Nibbles {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nibbles(")?;
        for n in &self.data {
            write!(f, "{:x}", n)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.data {
            write!(f, "{:x}", n)?;
        }
        Ok(())
    }
}

impl Serialize for Nibbles {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
