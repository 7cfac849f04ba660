//! # MPT Node Types
//!
//! The MPT has three node types plus the empty node:
//! 1. Leaf - stores a value at a key
//! 2. Extension - shares a common prefix path
//! 3. Branch - 16-way branch point + optional value
//!
//! Nodes are RLP encoded. A child whose encoding is shorter than
//! [`INLINE_THRESHOLD`] bytes is embedded in its parent, anything larger is
//! referenced by digest and lives in the node store.

use crate::error::{self, CodecError, Result};
use crate::hasher::TrieHasher;
use crate::nibbles::Nibbles;
use alloy_primitives::B256;
use alloy_rlp::{length_of_length, BufMut, Encodable, Header, EMPTY_STRING_CODE};

/// Encodings shorter than this are embedded instead of hashed
pub const INLINE_THRESHOLD: usize = 32;

/// Item count of an RLP encoded branch
const BRANCH_LIST_LENGTH: usize = 17;

/// Item count of an RLP encoded leaf or extension
const LEAF_OR_EXTENSION_LIST_LENGTH: usize = 2;

/// Node hash - either inline data or a hash reference
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeRef {
    /// Empty slot
    #[default]
    Empty,
    /// Inline node encoding (< 32 bytes)
    Inline(Vec<u8>),
    /// Hash reference to node in the store
    Hash(B256),
}

impl NodeRef {
    /// Check if empty
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    /// Inline or hashed reference for a non-empty node's encoding
    pub fn for_encoding<H: TrieHasher>(encoded: &[u8]) -> Self {
        if encoded.len() < INLINE_THRESHOLD {
            NodeRef::Inline(encoded.to_vec())
        } else {
            NodeRef::Hash(H::hash(encoded))
        }
    }

    /// Get hash if this is a hash reference
    pub fn as_hash(&self) -> Option<&B256> {
        match self {
            NodeRef::Hash(h) => Some(h),
            _ => None,
        }
    }

    fn encode_into(&self, out: &mut dyn BufMut) {
        match self {
            NodeRef::Empty => out.put_u8(EMPTY_STRING_CODE),
            NodeRef::Inline(data) => out.put_slice(data),
            NodeRef::Hash(h) => h.as_slice().encode(out),
        }
    }

    fn encoded_length(&self) -> usize {
        match self {
            NodeRef::Empty => 1,
            NodeRef::Inline(data) => data.len(),
            NodeRef::Hash(h) => h.as_slice().length(),
        }
    }

    fn from_item(item: &RlpItem<'_>) -> std::result::Result<Self, CodecError> {
        match *item {
            RlpItem::String(bytes) if bytes.is_empty() => Ok(NodeRef::Empty),
            RlpItem::String(bytes) if bytes.len() == B256::len_bytes() => {
                Ok(NodeRef::Hash(B256::from_slice(bytes)))
            }
            RlpItem::String(bytes) => Err(CodecError::InvalidChildRef(bytes.len())),
            RlpItem::List(raw) if raw.len() < INLINE_THRESHOLD => Ok(NodeRef::Inline(raw.to_vec())),
            RlpItem::List(raw) => Err(CodecError::InvalidChildRef(raw.len())),
        }
    }
}

/// MPT node types
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Node {
    /// Empty node (null)
    #[default]
    Empty,

    /// Leaf node: [encoded_path, value]
    /// The path is the remaining key nibbles
    Leaf { key: Nibbles, value: Vec<u8> },

    /// Extension node: [encoded_path, child]
    /// Shares a common prefix to save space
    Extension { key: Nibbles, child: NodeRef },

    /// Branch node: [child0, child1, ..., child15, value]
    /// 16 children (one per nibble) + optional value
    Branch {
        children: Box<[NodeRef; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl Node {
    /// Create leaf node
    pub fn leaf(key: Nibbles, value: Vec<u8>) -> Self {
        Node::Leaf { key, value }
    }

    /// Create extension node
    pub fn extension(key: Nibbles, child: NodeRef) -> Self {
        Node::Extension { key, child }
    }

    /// Check if node is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Child references in slot order; extension children carry no nibble
    pub fn children(&self) -> Vec<(Option<u8>, &NodeRef)> {
        match self {
            Node::Extension { child, .. } => vec![(None, child)],
            Node::Branch { children, .. } => children
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_empty())
                .map(|(i, c)| (Some(i as u8), c))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Verify the branch invariant: at least two children, or one child and a value
    pub fn check_branch_shape(&self) -> Result<()> {
        if let Node::Branch { children, value } = self {
            let count = children.iter().filter(|c| !c.is_empty()).count();
            if count == 0 || (count == 1 && value.is_none()) {
                return Err(error::invalid_branch_shape(count, value.is_some()));
            }
        }
        Ok(())
    }

    /// RLP encode this node
    pub fn rlp_encode(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }

    /// Decode an RLP encoded node, rejecting anything that is not exactly
    /// a 2-item or 17-item node list.
    pub fn rlp_decode(bytes: &[u8]) -> std::result::Result<Self, CodecError> {
        if bytes == [EMPTY_STRING_CODE] {
            return Ok(Node::Empty);
        }

        let items = decode_list(bytes)?;
        match items.len() {
            LEAF_OR_EXTENSION_LIST_LENGTH => {
                let (key, is_leaf) = Nibbles::expand(items[0].as_string()?)?;
                if is_leaf {
                    Ok(Node::Leaf {
                        key,
                        value: items[1].as_string()?.to_vec(),
                    })
                } else {
                    if key.is_empty() {
                        return Err(CodecError::EmptyExtension);
                    }
                    let child = NodeRef::from_item(&items[1])?;
                    if child.is_empty() {
                        return Err(CodecError::DanglingExtension);
                    }
                    Ok(Node::Extension { key, child })
                }
            }
            BRANCH_LIST_LENGTH => {
                let mut children: [NodeRef; 16] = Default::default();
                for (slot, item) in children.iter_mut().zip(&items[..16]) {
                    *slot = NodeRef::from_item(item)?;
                }
                let value = items[16].as_string()?;
                Ok(Node::Branch {
                    children: Box::new(children),
                    value: (!value.is_empty()).then(|| value.to_vec()),
                })
            }
            n => Err(CodecError::ItemCount(n)),
        }
    }

    /// Reference a parent would hold for this node.
    /// If RLP encoding is < 32 bytes, returns Inline reference,
    /// otherwise returns Hash reference.
    pub fn reference<H: TrieHasher>(&self) -> NodeRef {
        if self.is_empty() {
            return NodeRef::Empty;
        }

        NodeRef::for_encoding::<H>(&self.rlp_encode())
    }

    /// Digest of this node regardless of size (what a root is)
    pub fn digest<H: TrieHasher>(&self) -> B256 {
        if self.is_empty() {
            H::empty_root()
        } else {
            H::hash(&self.rlp_encode())
        }
    }

    fn payload_length(&self) -> usize {
        match self {
            Node::Empty => 0,
            Node::Leaf { key, value } => {
                key.compact(true).as_slice().length() + value.as_slice().length()
            }
            Node::Extension { key, child } => {
                key.compact(false).as_slice().length() + child.encoded_length()
            }
            Node::Branch { children, value } => {
                children.iter().map(NodeRef::encoded_length).sum::<usize>()
                    + value.as_deref().map_or(1, |v| v.length())
            }
        }
    }
}

impl Encodable for Node {
    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.payload_length();
        match self {
            Node::Empty => out.put_u8(EMPTY_STRING_CODE),

            Node::Leaf { key, value } => {
                Header { list: true, payload_length }.encode(out);
                key.compact(true).as_slice().encode(out);
                value.as_slice().encode(out);
            }

            Node::Extension { key, child } => {
                Header { list: true, payload_length }.encode(out);
                key.compact(false).as_slice().encode(out);
                child.encode_into(out);
            }

            Node::Branch { children, value } => {
                Header { list: true, payload_length }.encode(out);
                for child in children.iter() {
                    child.encode_into(out);
                }
                match value {
                    Some(v) => v.as_slice().encode(out),
                    None => out.put_u8(EMPTY_STRING_CODE),
                }
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            Node::Empty => 1,
            _ => {
                let payload_length = self.payload_length();
                length_of_length(payload_length) + payload_length
            }
        }
    }
}

// =========================================
// RLP list splitting
// =========================================

/// One element of a node list. Strings are returned as their payload,
/// nested lists as their full raw encoding (an inline child).
#[derive(Debug, Clone, Copy)]
enum RlpItem<'a> {
    String(&'a [u8]),
    List(&'a [u8]),
}

impl<'a> RlpItem<'a> {
    fn as_string(&self) -> std::result::Result<&'a [u8], CodecError> {
        match *self {
            RlpItem::String(bytes) => Ok(bytes),
            RlpItem::List(_) => Err(CodecError::ExpectedString),
        }
    }
}

fn decode_list(bytes: &[u8]) -> std::result::Result<Vec<RlpItem<'_>>, CodecError> {
    let mut buf = bytes;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(CodecError::ExpectedList);
    }
    if buf.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort.into());
    }
    if buf.len() > header.payload_length {
        return Err(CodecError::TrailingBytes(buf.len() - header.payload_length));
    }

    let mut items = Vec::with_capacity(BRANCH_LIST_LENGTH);
    let mut payload = buf;
    while !payload.is_empty() {
        let start = payload;
        let item = Header::decode(&mut payload)?;
        if payload.len() < item.payload_length {
            return Err(alloy_rlp::Error::InputTooShort.into());
        }
        let total = (start.len() - payload.len()) + item.payload_length;
        if item.list {
            items.push(RlpItem::List(&start[..total]));
        } else {
            items.push(RlpItem::String(&payload[..item.payload_length]));
        }
        payload = &start[total..];
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Keccak256;
    use alloy_primitives::keccak256;

    fn branch_with(slots: &[(usize, NodeRef)], value: Option<&[u8]>) -> Node {
        let mut children: Box<[NodeRef; 16]> = Box::default();
        for (i, r) in slots {
            children[*i] = r.clone();
        }
        Node::Branch {
            children,
            value: value.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn test_empty_node() {
        let node = Node::Empty;
        assert!(node.is_empty());
        assert_eq!(node.rlp_encode(), vec![0x80]);
        assert_eq!(node.reference::<Keccak256>(), NodeRef::Empty);
    }

    #[test]
    fn test_leaf_encoding_is_canonical() {
        let node = Node::leaf(Nibbles::from_bytes(b"hello"), b"world".to_vec());
        assert_eq!(
            hex::encode(node.rlp_encode()),
            "cd862068656c6c6f85776f726c64"
        );
        assert_eq!(node.length(), node.rlp_encode().len());

        // 14 bytes: embedded
        assert!(matches!(node.reference::<Keccak256>(), NodeRef::Inline(_)));
    }

    #[test]
    fn test_extension_over_inline_branch() {
        let a = Node::leaf(Nibbles::new(), b"a".to_vec()).reference::<Keccak256>();
        let b = Node::leaf(Nibbles::new(), b"b".to_vec()).reference::<Keccak256>();
        let branch = branch_with(&[(3, a), (4, b)], None);
        let child = branch.reference::<Keccak256>();
        assert!(matches!(child, NodeRef::Inline(_)));

        let node = Node::extension(Nibbles::from_raw(vec![0, 1, 2]), child);
        assert_eq!(
            hex::encode(node.rlp_encode()),
            "d9821012d5808080c22061c22062808080808080808080808080"
        );
    }

    #[test]
    fn test_branch_node() {
        let node = branch_with(&[(0, NodeRef::Hash(keccak256(b"test")))], Some(b"value"));

        let encoded = node.rlp_encode();
        assert_eq!(encoded.len(), node.length());

        // Branch nodes holding a digest are always > 32 bytes
        let reference = node.reference::<Keccak256>();
        assert_eq!(reference, NodeRef::Hash(keccak256(&encoded)));
        assert_eq!(node.digest::<Keccak256>(), keccak256(&encoded));
    }

    #[test]
    fn test_long_value_uses_long_list_header() {
        let node = Node::leaf(Nibbles::from_raw(vec![1]), vec![0xab; 100]);
        let encoded = node.rlp_encode();
        assert_eq!(encoded[0], 0xf8);
        assert_eq!(encoded.len(), node.length());
        assert_eq!(Node::rlp_decode(&encoded).unwrap(), node);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let leaf = Node::leaf(Nibbles::from_raw(vec![1, 2, 3]), b"v".to_vec());
        let inline = leaf.reference::<Keccak256>();
        let nodes = vec![
            Node::Empty,
            leaf.clone(),
            Node::leaf(Nibbles::new(), vec![0x01]),
            Node::extension(Nibbles::from_raw(vec![5]), NodeRef::Hash(keccak256(b"x"))),
            Node::extension(Nibbles::from_raw(vec![5, 6]), inline.clone()),
            branch_with(&[(1, inline.clone()), (15, NodeRef::Hash(keccak256(b"y")))], None),
            branch_with(&[(7, inline)], Some(b"branch value")),
        ];

        for node in nodes {
            let decoded = Node::rlp_decode(&node.rlp_encode()).unwrap();
            assert_eq!(decoded, node);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_arity() {
        // [0x20, "a", "b"]
        let three = [0xc3, 0x20, 0x61, 0x62];
        assert!(matches!(Node::rlp_decode(&three), Err(CodecError::ItemCount(3))));

        // plain string instead of a list
        assert!(matches!(Node::rlp_decode(&[0x82, 0x20, 0x61]), Err(CodecError::ExpectedList)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut encoded = Node::leaf(Nibbles::from_raw(vec![1]), b"v".to_vec()).rlp_encode();
        encoded.push(0x00);
        assert!(matches!(Node::rlp_decode(&encoded), Err(CodecError::TrailingBytes(1))));
    }

    #[test]
    fn test_decode_rejects_bad_child_ref() {
        // extension [0x11, <3-byte string>]
        let encoded = [0xc5, 0x11, 0x83, 0x01, 0x02, 0x03];
        assert!(matches!(
            Node::rlp_decode(&encoded),
            Err(CodecError::InvalidChildRef(3))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_extension() {
        // extension [0x00, 0xc0]
        let encoded = [0xc2, 0x00, 0xc0];
        assert!(matches!(Node::rlp_decode(&encoded), Err(CodecError::EmptyExtension)));
    }

    #[test]
    fn test_decode_reports_malformed_path() {
        // leaf with flag nibble 5
        let err = Node::rlp_decode(&[0xc2, 0x51, 0x61]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedPath);
    }

    #[test]
    fn test_branch_shape() {
        let leaf = Node::leaf(Nibbles::new(), b"a".to_vec()).reference::<Keccak256>();

        assert!(branch_with(&[(0, leaf.clone()), (1, leaf.clone())], None)
            .check_branch_shape()
            .is_ok());
        assert!(branch_with(&[(0, leaf.clone())], Some(b"v")).check_branch_shape().is_ok());

        let err = branch_with(&[(0, leaf)], None).check_branch_shape().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidBranchShape);
        assert!(branch_with(&[], Some(b"v")).check_branch_shape().is_err());
    }

    #[test]
    fn test_children() {
        let leaf = Node::leaf(Nibbles::new(), b"a".to_vec()).reference::<Keccak256>();
        let branch = branch_with(&[(2, leaf.clone()), (9, leaf.clone())], None);
        let slots: Vec<_> = branch.children().into_iter().map(|(n, _)| n).collect();
        assert_eq!(slots, vec![Some(2), Some(9)]);

        let ext = Node::extension(Nibbles::from_raw(vec![1]), leaf);
        assert_eq!(ext.children().len(), 1);
        assert_eq!(ext.children()[0].0, None);
    }

    #[test]
    fn test_node_ref() {
        let empty = NodeRef::Empty;
        assert!(empty.is_empty());

        let hash = NodeRef::Hash(keccak256(b"test"));
        assert!(!hash.is_empty());
        assert!(hash.as_hash().is_some());

        let inline = NodeRef::Inline(vec![0xc1, 0x01]);
        assert!(inline.as_hash().is_none());
    }

    #[test]
    fn test_for_encoding_threshold() {
        let short = vec![0xc0; INLINE_THRESHOLD - 1];
        assert_eq!(NodeRef::for_encoding::<Keccak256>(&short), NodeRef::Inline(short.clone()));

        let long = vec![0xc0; INLINE_THRESHOLD];
        let reference = NodeRef::for_encoding::<Keccak256>(&long);
        assert_eq!(reference.as_hash(), Some(&keccak256(&long)));
    }
}
