//! # Merkle Patricia Trie
//!
//! Implementation of Ethereum's Modified Merkle Patricia Trie over a
//! pluggable, reference-counted node store.
//!
//! This data structure is used for:
//! - State storage (accounts -> account data)
//! - Transaction tries
//! - Receipt tries
//!
//! Key features:
//! - Efficient proofs of inclusion/exclusion
//! - Cryptographic commitment to entire state
//! - Copy-on-write updates, old roots stay readable while their nodes are referenced
//!
//! ```rust
//! use mpt_trie::{PatriciaTrie, EMPTY_ROOT};
//!
//! let mut trie = PatriciaTrie::new_memory();
//! assert_eq!(trie.root_hash(), EMPTY_ROOT);
//!
//! trie.insert(b"dog", b"puppy").unwrap();
//! assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
//! ```

pub mod error;
pub mod hasher;
pub mod nibbles;
pub mod node;
pub mod proof;
pub mod storage;
pub mod trie;
pub mod walk;

pub use error::{CodecError, Error, ErrorKind, ErrorStatus, Result};
pub use hasher::{Keccak256, TrieHasher, EMPTY_ROOT};
pub use nibbles::Nibbles;
pub use node::{Node, NodeRef, INLINE_THRESHOLD};
pub use proof::Proof;
pub use storage::{Change, ChangeSet, MemoryStore, NodeStore, SharedStore};
pub use trie::PatriciaTrie;
pub use walk::{NodeId, NodeKind, NodeView, TrieView};

pub use alloy_primitives::B256;
