//! # Merkle Proofs
//!
//! Generate and verify proofs of inclusion/exclusion for keys in the trie.
//! A proof is the encoding of every hashed node on the path to the key,
//! root first. Inline nodes travel inside their parents.

use crate::error::{self, hex_digest, Result};
use crate::hasher::TrieHasher;
use crate::nibbles::Nibbles;
use crate::node::{Node, NodeRef};
use crate::storage::NodeStore;
use crate::trie::{decode_inline, load_node};
use alloy_primitives::B256;
use serde_json::{json, Value};
use std::collections::HashMap;

/// A Merkle proof for a key in the trie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// The key being proven
    pub key: Vec<u8>,
    /// The value (None if proving non-existence)
    pub value: Option<Vec<u8>>,
    /// Proof nodes (RLP encoded)
    pub nodes: Vec<Vec<u8>>,
}

impl Proof {
    /// Create new proof
    pub fn new(key: Vec<u8>, value: Option<Vec<u8>>, nodes: Vec<Vec<u8>>) -> Self {
        Proof { key, value, nodes }
    }

    /// Collect the proof for `key` from the version identified by `root`
    pub fn collect<S: NodeStore, H: TrieHasher>(store: &S, root: &B256, key: &[u8]) -> Result<Self> {
        let mut nodes = Vec::new();
        let value = if *root == H::empty_root() {
            None
        } else {
            descend(*root, key, |digest| {
                let (_, encoded) = load_node::<S, H>(store, digest)?;
                nodes.push(encoded.clone());
                Ok(encoded)
            })
            .map_err(|e| e.with_operation("proof::collect"))?
        };

        Ok(Proof::new(key.to_vec(), value, nodes))
    }

    /// Verify proof against a root hash, using nothing but the proof nodes.
    ///
    /// Returns the proven value; fails with `InvalidProof` when a needed
    /// node is absent (or was tampered with) or when the result disagrees
    /// with `self.value`.
    pub fn verify<H: TrieHasher>(&self, root: &B256) -> Result<Option<Vec<u8>>> {
        let found = if *root == H::empty_root() {
            None
        } else {
            let by_digest: HashMap<B256, &[u8]> = self
                .nodes
                .iter()
                .map(|n| (H::hash(n), n.as_slice()))
                .collect();

            descend(*root, &self.key, |digest| {
                by_digest
                    .get(digest)
                    .map(|n| n.to_vec())
                    .ok_or_else(|| {
                        error::invalid_proof(format!("proof lacks node {}", hex_digest(digest)))
                            .with_context("digest", hex_digest(digest))
                    })
            })
            .map_err(|e| e.with_operation("proof::verify"))?
        };

        if found != self.value {
            return Err(error::invalid_proof("proven value differs from claimed value")
                .with_operation("proof::verify")
                .with_context("key", hex::encode(&self.key)));
        }
        Ok(found)
    }

    /// Hex-rendered document
    pub fn to_json(&self) -> Value {
        json!({
            "key": hex::encode(&self.key),
            "value": self.value.as_ref().map(hex::encode),
            "nodes": self.nodes.iter().map(hex::encode).collect::<Vec<_>>(),
        })
    }
}

/// Follow `key` from `root`, fetching hashed nodes through `fetch`
fn descend<F>(root: B256, key: &[u8], mut fetch: F) -> Result<Option<Vec<u8>>>
where
    F: FnMut(&B256) -> Result<Vec<u8>>,
{
    let mut key = Nibbles::from_bytes(key);
    let mut next = NodeRef::Hash(root);

    loop {
        let node = match &next {
            NodeRef::Empty => return Ok(None),
            NodeRef::Inline(data) => decode_inline(data)?,
            NodeRef::Hash(digest) => decode_inline(&fetch(digest)?)?,
        };

        match node {
            Node::Empty => return Ok(None),

            Node::Leaf { key: leaf_key, value } => return Ok((leaf_key == key).then_some(value)),

            Node::Extension { key: ext_key, child } => {
                if !key.starts_with(&ext_key) {
                    return Ok(None);
                }
                key = key.slice(ext_key.len());
                next = child;
            }

            Node::Branch { mut children, value } => {
                let Some(idx) = key.first() else {
                    return Ok(value);
                };
                key = key.slice(1);
                next = std::mem::take(&mut children[idx as usize]);
            }
        }
    }
}
