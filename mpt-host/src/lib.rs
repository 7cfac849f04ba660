//! # mpt-host
//!
//! Embedding surface for the trie: a host object holding the active root,
//! node stores for the two ways an embedder can own persistence, and the
//! layered configuration the command-line tool uses.
//!
//! - [`FileStore`]: nodes as JSON documents in a directory, root recorded in `root.json`
//! - [`CallbackStore`]: nodes fetched through a host function, written nodes
//!   handed back through the change set

pub mod callback;
pub mod config;
pub mod error;
pub mod file_store;
pub mod host;

pub use callback::CallbackStore;
pub use config::{HostConfig, DEFAULT_MAX_VALUE_SIZE, STORE_DIR_ENV};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use file_store::FileStore;
pub use host::TrieHost;
