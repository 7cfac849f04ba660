//! # Patricia Trie
//!
//! The trie engine. Every mutation is copy-on-write: nodes on the path to
//! the key are loaded, rebuilt bottom-up and committed under new digests,
//! while untouched subtrees keep their references. Reference count deltas
//! are staged while the mutation runs and reach the store in one
//! [`NodeStore::apply`] once the new root is known, so a failed mutation
//! leaves both the store and the root as they were.

use crate::error::{self, hex_digest, Result};
use crate::hasher::{Keccak256, TrieHasher};
use crate::nibbles::Nibbles;
use crate::node::{Node, NodeRef};
use crate::proof::Proof;
use crate::storage::{ChangeSet, MemoryStore, NodeStore};
use crate::walk::{self, TrieView};
use alloy_primitives::B256;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Load, verify and decode the node stored under `digest`
pub(crate) fn load_node<S: NodeStore, H: TrieHasher>(
    store: &S,
    digest: &B256,
) -> Result<(Node, Vec<u8>)> {
    let encoded = store
        .load(digest)
        .map_err(|e| e.with_operation("trie::load"))?
        .ok_or_else(|| error::missing_node(digest).with_operation("trie::load"))?;
    let node = decode_verified::<H>(digest, &encoded)?;
    Ok((node, encoded))
}

/// Decode bytes that were stored under `digest`, checking content addressing
/// and branch shape
pub(crate) fn decode_verified<H: TrieHasher>(digest: &B256, encoded: &[u8]) -> Result<Node> {
    trace!(digest = %hex_digest(digest), len = encoded.len(), "loading node");

    let actual = H::hash(encoded);
    if actual != *digest {
        return Err(error::hash_mismatch(digest, &actual).with_operation("trie::load"));
    }

    decode_inline(encoded).map_err(|e| e.with_context("digest", hex_digest(digest)))
}

/// Decode an embedded node
pub(crate) fn decode_inline(encoded: &[u8]) -> Result<Node> {
    let node = Node::rlp_decode(encoded).map_err(|e| e.into_error("trie::decode"))?;
    node.check_branch_shape()
        .map_err(|e| e.with_operation("trie::decode"))?;
    Ok(node)
}

/// Resolve a child reference without touching reference counts
pub(crate) fn resolve_ref<S: NodeStore, H: TrieHasher>(store: &S, node_ref: &NodeRef) -> Result<Node> {
    match node_ref {
        NodeRef::Empty => Ok(Node::Empty),
        NodeRef::Inline(data) => decode_inline(data),
        NodeRef::Hash(digest) => load_node::<S, H>(store, digest).map(|(node, _)| node),
    }
}

/// Resolve a root digest; the empty root needs no storage
pub(crate) fn resolve_root<S: NodeStore, H: TrieHasher>(store: &S, root: &B256) -> Result<Node> {
    if *root == H::empty_root() {
        return Ok(Node::Empty);
    }
    load_node::<S, H>(store, root).map(|(node, _)| node)
}

// =========================================
// Mutation
// =========================================

/// One in-flight insert or remove.
///
/// Reads go to the store as it was when the mutation started; every
/// reference count change lands in `staged`.
struct Mutation<'a, S, H> {
    store: &'a S,
    staged: ChangeSet,
    _hasher: PhantomData<H>,
}

impl<'a, S: NodeStore, H: TrieHasher> Mutation<'a, S, H> {
    fn new(store: &'a S) -> Self {
        Mutation {
            store,
            staged: ChangeSet::new(),
            _hasher: PhantomData,
        }
    }

    fn load(&self, digest: &B256) -> Result<(Node, Vec<u8>)> {
        if let Some(change) = self.staged.get(digest).filter(|c| c.ref_delta > 0) {
            let node = decode_verified::<H>(digest, &change.encoded)?;
            return Ok((node, change.encoded.clone()));
        }
        load_node::<S, H>(self.store, digest)
    }

    /// Resolve a reference that is about to be replaced, releasing it
    fn take(&mut self, node_ref: NodeRef) -> Result<Node> {
        match node_ref {
            NodeRef::Hash(digest) => {
                let (node, encoded) = self.load(&digest)?;
                self.staged.record(digest, &encoded, -1);
                Ok(node)
            }
            NodeRef::Inline(data) => decode_inline(&data),
            NodeRef::Empty => Ok(Node::Empty),
        }
    }

    fn take_root(&mut self, root: &B256) -> Result<Node> {
        if *root == H::empty_root() {
            return Ok(Node::Empty);
        }
        self.take(NodeRef::Hash(*root))
    }

    /// Store node, return the reference a parent holds
    fn commit(&mut self, node: Node) -> NodeRef {
        if node.is_empty() {
            return NodeRef::Empty;
        }

        let encoded = node.rlp_encode();
        let reference = NodeRef::for_encoding::<H>(&encoded);
        if let Some(digest) = reference.as_hash() {
            self.staged.record(*digest, &encoded, 1);
        }
        reference
    }

    /// The root is stored by digest whatever its size
    fn commit_root(&mut self, node: Node) -> B256 {
        let digest = node.digest::<H>();
        if !node.is_empty() {
            self.staged.record(digest, &node.rlp_encode(), 1);
        }
        digest
    }

    /// Put `value` at `remaining` below a fresh branch
    fn place(&mut self, children: &mut [NodeRef; 16], branch_value: &mut Option<Vec<u8>>, remaining: Nibbles, value: Vec<u8>) {
        match remaining.first() {
            None => *branch_value = Some(value),
            Some(idx) => {
                let leaf = Node::leaf(remaining.slice(1), value);
                children[idx as usize] = self.commit(leaf);
            }
        }
    }

    /// Internal recursive insert
    fn insert_at(&mut self, node: Node, key: Nibbles, value: Vec<u8>) -> Result<Node> {
        match node {
            Node::Empty => Ok(Node::leaf(key, value)),

            Node::Leaf { key: leaf_key, value: leaf_value } => {
                if leaf_key == key {
                    // Update existing leaf
                    return Ok(Node::leaf(key, value));
                }

                // Split into branch at the first differing nibble
                let common_len = key.common_prefix_len(&leaf_key);
                let mut children: Box<[NodeRef; 16]> = Box::default();
                let mut branch_value = None;
                self.place(&mut children, &mut branch_value, leaf_key.slice(common_len), leaf_value);
                self.place(&mut children, &mut branch_value, key.slice(common_len), value);
                let branch = Node::Branch { children, value: branch_value };

                Ok(self.wrap(key.slice_range(0, common_len), branch))
            }

            Node::Extension { key: ext_key, child } => {
                let common_len = key.common_prefix_len(&ext_key);

                if common_len == ext_key.len() {
                    // Full match - descend into child
                    let child_node = self.take(child)?;
                    let new_child = self.insert_at(child_node, key.slice(common_len), value)?;
                    return Ok(Node::extension(ext_key, self.commit(new_child)));
                }

                // Partial match - split extension
                let ext_remaining = ext_key.slice(common_len);
                let mut children: Box<[NodeRef; 16]> = Box::default();
                let mut branch_value = None;

                let ext_idx = ext_remaining.get(0).unwrap_or_default() as usize;
                children[ext_idx] = if ext_remaining.len() == 1 {
                    child
                } else {
                    self.commit(Node::extension(ext_remaining.slice(1), child))
                };
                self.place(&mut children, &mut branch_value, key.slice(common_len), value);
                let branch = Node::Branch { children, value: branch_value };

                Ok(self.wrap(ext_key.slice_range(0, common_len), branch))
            }

            Node::Branch { mut children, value: branch_value } => {
                let Some(idx) = key.first() else {
                    // Set value at branch
                    return Ok(Node::Branch { children, value: Some(value) });
                };

                let idx = idx as usize;
                let child = std::mem::take(&mut children[idx]);
                let child_node = self.take(child)?;
                let new_child = self.insert_at(child_node, key.slice(1), value)?;
                children[idx] = self.commit(new_child);

                Ok(Node::Branch { children, value: branch_value })
            }
        }
    }

    /// Wrap with extension if prefix exists
    fn wrap(&mut self, prefix: Nibbles, branch: Node) -> Node {
        if prefix.is_empty() {
            branch
        } else {
            Node::extension(prefix, self.commit(branch))
        }
    }

    /// Internal recursive delete; `None` when the key is absent
    fn delete_at(&mut self, node: Node, key: Nibbles) -> Result<Option<Node>> {
        match node {
            Node::Empty => Ok(None),

            Node::Leaf { key: leaf_key, .. } => Ok((leaf_key == key).then_some(Node::Empty)),

            Node::Extension { key: ext_key, child } => {
                if !key.starts_with(&ext_key) {
                    return Ok(None);
                }

                let child_node = self.take(child)?;
                let Some(new_child) = self.delete_at(child_node, key.slice(ext_key.len()))? else {
                    return Ok(None);
                };

                self.collapse_extension(ext_key, new_child).map(Some)
            }

            Node::Branch { mut children, value } => {
                let Some(idx) = key.first() else {
                    if value.is_none() {
                        return Ok(None);
                    }
                    // Remove value, collapse if possible
                    return self.collapse_branch(children, None).map(Some);
                };

                let idx = idx as usize;
                if children[idx].is_empty() {
                    return Ok(None);
                }

                let child = std::mem::take(&mut children[idx]);
                let child_node = self.take(child)?;
                let Some(new_child) = self.delete_at(child_node, key.slice(1))? else {
                    return Ok(None);
                };
                children[idx] = self.commit(new_child);

                self.collapse_branch(children, value).map(Some)
            }
        }
    }

    /// Collapse extension after child modification
    fn collapse_extension(&mut self, key: Nibbles, child: Node) -> Result<Node> {
        Ok(match child {
            Node::Empty => Node::Empty,

            Node::Leaf { key: child_key, value } => {
                let mut merged = key;
                merged.extend(&child_key);
                Node::leaf(merged, value)
            }

            Node::Extension { key: child_key, child: grandchild } => {
                let mut merged = key;
                merged.extend(&child_key);
                Node::extension(merged, grandchild)
            }

            branch @ Node::Branch { .. } => Node::extension(key, self.commit(branch)),
        })
    }

    /// Collapse branch after child deletion
    fn collapse_branch(&mut self, mut children: Box<[NodeRef; 16]>, value: Option<Vec<u8>>) -> Result<Node> {
        let occupied: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, _)| i)
            .collect();

        match (occupied.as_slice(), value) {
            ([], None) => Ok(Node::Empty),

            // Only value - convert to leaf
            ([], Some(value)) => Ok(Node::leaf(Nibbles::new(), value)),

            // Single child - absorb it
            (&[idx], None) => {
                let child = self.take(std::mem::take(&mut children[idx]))?;
                let nibble = idx as u8;
                Ok(match child {
                    Node::Leaf { key, value } => Node::leaf(key.with_prefix(nibble), value),
                    Node::Extension { key, child } => Node::extension(key.with_prefix(nibble), child),
                    branch => Node::extension(Nibbles::from_raw(vec![nibble]), self.commit(branch)),
                })
            }

            // Keep as branch
            (_, value) => Ok(Node::Branch { children, value }),
        }
    }

    fn finish(self) -> ChangeSet {
        self.staged
    }
}

// =========================================
// Trie
// =========================================

/// Merkle Patricia Trie over a reference-counted node store
#[derive(Debug)]
pub struct PatriciaTrie<S, H = Keccak256> {
    /// Root digest
    root: B256,
    /// Node store
    store: S,
    /// Reference count deltas since the last checkpoint
    changes: ChangeSet,
    _hasher: PhantomData<H>,
}

impl<S: NodeStore, H: TrieHasher> PatriciaTrie<S, H> {
    /// Create new empty trie
    pub fn new(store: S) -> Self {
        Self::from_root(store, H::empty_root())
    }

    /// Open an existing version. Nodes are loaded lazily, so a root absent
    /// from the store only fails on first access.
    pub fn from_root(store: S, root: B256) -> Self {
        PatriciaTrie {
            root,
            store,
            changes: ChangeSet::new(),
            _hasher: PhantomData,
        }
    }

    /// Get root hash
    pub fn root_hash(&self) -> B256 {
        self.root
    }

    /// Check if trie is empty
    pub fn is_empty(&self) -> bool {
        self.root == H::empty_root()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct store access. Changing reference counts behind the trie's
    /// back breaks the accounting of the current version.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Get value for key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_at(&self.root, key)
    }

    /// Get value for key in the version identified by `root`
    pub fn get_at(&self, root: &B256, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let node = resolve_root::<S, H>(&self.store, root)?;
        self.get_node(node, &Nibbles::from_bytes(key))
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.get(key).map(|v| v.is_some())
    }

    pub fn contains_at(&self, root: &B256, key: &[u8]) -> Result<bool> {
        self.get_at(root, key).map(|v| v.is_some())
    }

    /// Internal recursive get
    fn get_node(&self, node: Node, key: &Nibbles) -> Result<Option<Vec<u8>>> {
        match node {
            Node::Empty => Ok(None),

            Node::Leaf { key: leaf_key, value } => Ok((leaf_key == *key).then_some(value)),

            Node::Extension { key: ext_key, child } => {
                if !key.starts_with(&ext_key) {
                    return Ok(None);
                }

                let child_node = resolve_ref::<S, H>(&self.store, &child)?;
                self.get_node(child_node, &key.slice(ext_key.len()))
            }

            Node::Branch { children, value } => {
                let Some(idx) = key.first() else {
                    return Ok(value);
                };

                let child = &children[idx as usize];
                if child.is_empty() {
                    return Ok(None);
                }

                let child_node = resolve_ref::<S, H>(&self.store, child)?;
                self.get_node(child_node, &key.slice(1))
            }
        }
    }

    /// Insert key-value pair and return the new root.
    ///
    /// An empty value removes the key, the canonical encoding cannot tell
    /// an empty value from an absent one.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<B256> {
        if value.is_empty() {
            return self.remove(key);
        }

        let mut mutation = Mutation::<S, H>::new(&self.store);
        let root = mutation
            .take_root(&self.root)
            .map_err(|e| e.with_operation("trie::insert"))?;
        let new_root = mutation
            .insert_at(root, Nibbles::from_bytes(key), value.to_vec())
            .map_err(|e| e.with_operation("trie::insert"))?;
        let new_root = mutation.commit_root(new_root);
        let staged = mutation.finish();

        self.publish("insert", new_root, staged)
    }

    /// Delete key from trie and return the new root. Removing an absent key
    /// changes nothing.
    pub fn remove(&mut self, key: &[u8]) -> Result<B256> {
        let mut mutation = Mutation::<S, H>::new(&self.store);
        let root = mutation
            .take_root(&self.root)
            .map_err(|e| e.with_operation("trie::remove"))?;
        let new_root = mutation
            .delete_at(root, Nibbles::from_bytes(key))
            .map_err(|e| e.with_operation("trie::remove"))?;

        let Some(new_root) = new_root else {
            trace!(key = %hex::encode(key), "remove of absent key");
            return Ok(self.root);
        };
        let new_root = mutation.commit_root(new_root);
        let staged = mutation.finish();

        self.publish("remove", new_root, staged)
    }

    /// Make a finished mutation visible
    fn publish(&mut self, op: &'static str, new_root: B256, staged: ChangeSet) -> Result<B256> {
        self.store
            .apply(&staged)
            .map_err(|e| e.with_operation("trie::publish"))?;
        self.changes.merge(&staged);

        debug!(
            op,
            old_root = %hex_digest(&self.root),
            new_root = %hex_digest(&new_root),
            changes = staged.len(),
            "trie mutated"
        );
        self.root = new_root;
        Ok(new_root)
    }

    /// Reference count deltas accumulated since the last checkpoint
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Drain the accumulated change set
    pub fn checkpoint(&mut self) -> ChangeSet {
        std::mem::take(&mut self.changes)
    }

    /// Materialize the current version for inspection
    pub fn walk(&self) -> Result<TrieView> {
        walk::walk::<S, H>(&self.store, &self.root)
    }

    /// Collect the nodes proving presence or absence of `key`
    pub fn prove(&self, key: &[u8]) -> Result<Proof> {
        Proof::collect::<S, H>(&self.store, &self.root, key)
    }
}

impl PatriciaTrie<MemoryStore> {
    /// Create new trie with in-memory store
    pub fn new_memory() -> Self {
        PatriciaTrie::new(MemoryStore::new())
    }
}
