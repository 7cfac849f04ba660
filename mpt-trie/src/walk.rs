//! # Tree walk
//!
//! Materializes a trie version into an arena of inspectable nodes. The
//! stored graph is a DAG: identical subtrees share one digest, so every
//! hashed node gets exactly one arena slot and parents refer to it by index.
//! The walker carries its ancestor digests down the recursion and fails if
//! a child is already among them.

use crate::error::{self, hex_digest, Result};
use crate::hasher::TrieHasher;
use crate::nibbles::Nibbles;
use crate::node::{Node, NodeRef};
use crate::storage::NodeStore;
use crate::trie::{decode_inline, load_node};
use alloy_primitives::B256;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Where a node lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    /// Stored under its digest
    Digest(B256),
    /// Embedded in its parent
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Extension,
    Branch,
}

/// One materialized node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Path segment held by a leaf or extension, empty for branches
    pub path: Nibbles,
    pub value: Option<Vec<u8>>,
    pub encoded: Vec<u8>,
    /// Branch slots, nibble to arena index
    pub children: BTreeMap<u8, usize>,
    /// Extension target
    pub child: Option<usize>,
}

/// Arena of materialized nodes for one root
#[derive(Debug, Clone, Default)]
pub struct TrieView {
    root: B256,
    nodes: Vec<NodeView>,
    index: HashMap<B256, usize>,
    top: Option<usize>,
}

impl TrieView {
    /// Root digest this view was built from
    pub fn root(&self) -> B256 {
        self.root
    }

    /// Arena index of the root node, `None` for the empty trie
    pub fn top(&self) -> Option<usize> {
        self.top
    }

    pub fn node(&self, index: usize) -> Option<&NodeView> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[NodeView] {
        &self.nodes
    }

    /// Arena index of a hashed node
    pub fn find(&self, digest: &B256) -> Option<usize> {
        self.index.get(digest).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every key/value pair, in key order
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        if let Some(top) = self.top {
            self.collect(top, Nibbles::new(), &mut out);
        }
        out
    }

    fn collect(&self, index: usize, mut prefix: Nibbles, out: &mut Vec<(Vec<u8>, Vec<u8>)>) {
        let view = &self.nodes[index];
        prefix.extend(&view.path);

        if let Some(value) = &view.value {
            if let Some(key) = prefix.to_bytes() {
                out.push((key, value.clone()));
            }
        }
        if let Some(child) = view.child {
            self.collect(child, prefix.clone(), out);
        }
        for (nibble, child) in &view.children {
            let mut next = prefix.clone();
            next.push(*nibble);
            self.collect(*child, next, out);
        }
    }

    /// Nested, hex-rendered rendition of the tree
    pub fn to_json(&self) -> Value {
        let tree = self.top.map_or(Value::Null, |top| self.render(top));
        json!({
            "root": hex_digest(&self.root),
            "tree": tree,
        })
    }

    fn render(&self, index: usize) -> Value {
        let view = &self.nodes[index];
        let id = match view.id {
            NodeId::Digest(digest) => hex_digest(&digest),
            NodeId::Inline => "inline".to_string(),
        };

        let mut doc = Map::new();
        doc.insert("id".into(), json!(id));
        doc.insert("kind".into(), json!(view.kind));
        doc.insert("path".into(), json!(view.path));
        doc.insert("value".into(), json!(view.value.as_ref().map(hex::encode)));
        doc.insert("encoded".into(), json!(hex::encode(&view.encoded)));

        match view.kind {
            NodeKind::Branch => {
                let children: Map<String, Value> = view
                    .children
                    .iter()
                    .map(|(nibble, child)| (format!("{:x}", nibble), self.render(*child)))
                    .collect();
                doc.insert("children".into(), Value::Object(children));
            }
            NodeKind::Extension => {
                if let Some(child) = view.child {
                    doc.insert("child".into(), self.render(child));
                }
            }
            NodeKind::Leaf => {}
        }

        Value::Object(doc)
    }
}

struct Walker<'a, S, H> {
    store: &'a S,
    view: TrieView,
    ancestors: Vec<B256>,
    _hasher: std::marker::PhantomData<H>,
}

impl<S: NodeStore, H: TrieHasher> Walker<'_, S, H> {
    fn visit_digest(&mut self, digest: B256) -> Result<usize> {
        if self.ancestors.contains(&digest) {
            return Err(error::cyclic_parent(&digest, self.ancestors.len()).with_operation("walk"));
        }
        if let Some(&index) = self.view.index.get(&digest) {
            return Ok(index);
        }

        let (node, encoded) = load_node::<S, H>(self.store, &digest)?;
        self.ancestors.push(digest);
        let index = self.visit_node(NodeId::Digest(digest), node, encoded);
        self.ancestors.pop();

        let index = index?;
        self.view.index.insert(digest, index);
        Ok(index)
    }

    fn visit_ref(&mut self, node_ref: &NodeRef) -> Result<usize> {
        match node_ref {
            NodeRef::Hash(digest) => self.visit_digest(*digest),
            NodeRef::Inline(data) => {
                let node = decode_inline(data)?;
                self.visit_node(NodeId::Inline, node, data.clone())
            }
            NodeRef::Empty => Err(error::Error::corrupt_node("empty child reference").with_operation("walk")),
        }
    }

    fn visit_node(&mut self, id: NodeId, node: Node, encoded: Vec<u8>) -> Result<usize> {
        let mut children = BTreeMap::new();
        let mut child = None;

        for (slot, reference) in node.children() {
            let index = self.visit_ref(reference)?;
            match slot {
                Some(nibble) => {
                    children.insert(nibble, index);
                }
                None => child = Some(index),
            }
        }

        let (kind, path, value) = match node {
            Node::Empty => {
                return Err(error::Error::corrupt_node("empty node below root").with_operation("walk"));
            }
            Node::Leaf { key, value } => (NodeKind::Leaf, key, Some(value)),
            Node::Extension { key, .. } => (NodeKind::Extension, key, None),
            Node::Branch { value, .. } => (NodeKind::Branch, Nibbles::new(), value),
        };

        self.view.nodes.push(NodeView {
            id,
            kind,
            path,
            value,
            encoded,
            children,
            child,
        });
        Ok(self.view.nodes.len() - 1)
    }
}

/// Materialize the version identified by `root`
pub fn walk<S: NodeStore, H: TrieHasher>(store: &S, root: &B256) -> Result<TrieView> {
    let mut walker = Walker::<S, H> {
        store,
        view: TrieView {
            root: *root,
            ..TrieView::default()
        },
        ancestors: Vec::new(),
        _hasher: std::marker::PhantomData,
    };

    if *root != H::empty_root() {
        let top = walker.visit_digest(*root)?;
        walker.view.top = Some(top);
    }

    tracing::debug!(root = %hex_digest(root), nodes = walker.view.len(), "walked trie");
    Ok(walker.view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::{ErrorKind, Keccak256, PatriciaTrie};

    /// Every input hashes to the same digest, so a node can name itself
    struct ConstantHasher;

    impl TrieHasher for ConstantHasher {
        fn hash(_data: &[u8]) -> B256 {
            B256::repeat_byte(0x11)
        }

        fn empty_root() -> B256 {
            B256::ZERO
        }
    }

    #[test]
    fn test_walk_empty() {
        let trie = PatriciaTrie::new_memory();
        let view = trie.walk().unwrap();
        assert!(view.is_empty());
        assert_eq!(view.top(), None);
        assert_eq!(view.to_json()["tree"], Value::Null);
    }

    #[test]
    fn test_walk_lists_entries_in_key_order() {
        let mut trie = PatriciaTrie::new_memory();
        trie.insert(b"dog", b"puppy").unwrap();
        trie.insert(b"do", b"verb").unwrap();
        trie.insert(b"horse", b"stallion").unwrap();

        let view = trie.walk().unwrap();
        assert_eq!(
            view.entries(),
            vec![
                (b"do".to_vec(), b"verb".to_vec()),
                (b"dog".to_vec(), b"puppy".to_vec()),
                (b"horse".to_vec(), b"stallion".to_vec()),
            ]
        );

        let top = view.node(view.top().unwrap()).unwrap();
        assert_eq!(top.id, NodeId::Digest(trie.root_hash()));
        assert_eq!(top.kind, NodeKind::Extension);
    }

    #[test]
    fn test_view_links_follow_node_children() {
        let mut trie = PatriciaTrie::new_memory();
        for i in 0..12u8 {
            trie.insert(&[0xa0, i * 16, i], &[i; 36]).unwrap();
        }

        let view = trie.walk().unwrap();
        for node_view in view.nodes() {
            let node = Node::rlp_decode(&node_view.encoded).unwrap();
            let slots = node.children();
            let nibbles: Vec<u8> = slots.iter().filter_map(|(slot, _)| *slot).collect();
            assert_eq!(node_view.children.keys().copied().collect::<Vec<_>>(), nibbles);
            assert_eq!(node_view.child.is_some(), slots.iter().any(|(slot, _)| slot.is_none()));
        }
        assert_eq!(view.entries().len(), 12);
    }

    #[test]
    fn test_shared_subtree_gets_one_slot() {
        let mut trie = PatriciaTrie::new_memory();
        let value = vec![0x42; 40];
        trie.insert(&[0x10, 0x00], &value).unwrap();
        trie.insert(&[0x20, 0x00], &value).unwrap();

        let view = trie.walk().unwrap();
        assert_eq!(view.len(), 2);

        let top = view.node(view.top().unwrap()).unwrap();
        assert_eq!(top.kind, NodeKind::Branch);
        assert_eq!(top.children[&1], top.children[&2]);

        let shared = view.node(top.children[&1]).unwrap();
        let NodeId::Digest(digest) = shared.id else {
            panic!("large leaf should be hashed");
        };
        assert_eq!(trie.store().ref_count(&digest).unwrap(), 2);
        assert_eq!(view.entries().len(), 2);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let digest = ConstantHasher::hash(&[]);
        let node = Node::extension(Nibbles::from_raw(vec![1]), NodeRef::Hash(digest));
        let mut store = MemoryStore::new();
        store.store(digest, &node.rlp_encode(), 1).unwrap();

        let err = walk::<_, ConstantHasher>(&store, &digest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicParent);
        assert_eq!(err.context_value("depth"), Some("1"));
    }

    #[test]
    fn test_missing_child_fails_walk() {
        let node = Node::extension(
            Nibbles::from_raw(vec![1]),
            NodeRef::Hash(B256::repeat_byte(0xab)),
        );
        let encoded = node.rlp_encode();
        let digest = Keccak256::hash(&encoded);
        let mut store = MemoryStore::new();
        store.store(digest, &encoded, 1).unwrap();

        let err = walk::<_, Keccak256>(&store, &digest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingNode);
    }

    #[test]
    fn test_json_export() {
        let mut trie = PatriciaTrie::new_memory();
        trie.insert(&[0x01, 0x23], b"a").unwrap();
        trie.insert(&[0x01, 0x24], b"b").unwrap();

        let doc = trie.walk().unwrap().to_json();
        assert_eq!(doc["root"], json!(hex_digest(&trie.root_hash())));
        assert_eq!(doc["tree"]["kind"], "extension");
        assert_eq!(doc["tree"]["path"], "012");

        let branch = &doc["tree"]["child"];
        assert_eq!(branch["id"], "inline");
        assert_eq!(branch["children"]["3"]["value"], "61");
        assert_eq!(branch["children"]["4"]["value"], "62");
    }
}
