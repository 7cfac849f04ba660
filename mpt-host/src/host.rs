//! # Trie host
//!
//! The surface an embedder drives: a single active root that mutations
//! replace in place, plus the change set an embedder drains to persist or
//! diff versions.

use crate::callback::CallbackStore;
use crate::config::{HostConfig, DEFAULT_MAX_VALUE_SIZE};
use crate::error::{self, Result};
use crate::file_store::FileStore;
use alloy_primitives::B256;
use mpt_trie::{ChangeSet, Keccak256, NodeStore, PatriciaTrie, Proof, TrieHasher, TrieView};
use tracing::{debug, info};

/// Trie with one active root
#[derive(Debug)]
pub struct TrieHost<S> {
    trie: PatriciaTrie<S>,
    max_value_size: usize,
}

impl<S: NodeStore> TrieHost<S> {
    /// Host an empty trie
    pub fn new(store: S) -> Self {
        Self::open(store, Keccak256::empty_root())
    }

    /// Host an existing root
    pub fn open(store: S, root: B256) -> Self {
        Self {
            trie: PatriciaTrie::from_root(store, root),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }

    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = max_value_size;
        self
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_size {
            return Err(error::invalid_argument(format!(
                "value of {} bytes exceeds limit of {}",
                value.len(),
                self.max_value_size
            ))
            .with_operation("host::insert")
            .with_context("key", hex::encode(key)));
        }

        let root = self.trie.insert(key, value)?;
        debug!(key = %hex::encode(key), root = %hex::encode(root), "inserted");
        Ok(())
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        let root = self.trie.remove(key)?;
        debug!(key = %hex::encode(key), root = %hex::encode(root), "removed");
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.trie.get(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.trie.contains(key)
    }

    /// Active root digest
    pub fn root(&self) -> B256 {
        self.trie.root_hash()
    }

    /// Materialize the active version
    pub fn export_tree(&self) -> Result<TrieView> {
        self.trie.walk()
    }

    pub fn prove(&self, key: &[u8]) -> Result<Proof> {
        self.trie.prove(key)
    }

    /// Every digest written or released since the last call, with its delta
    pub fn take_changes(&mut self) -> ChangeSet {
        self.trie.checkpoint()
    }

    pub fn store(&self) -> &S {
        self.trie.store()
    }

    pub fn into_store(self) -> S {
        self.trie.into_store()
    }
}

impl TrieHost<FileStore> {
    /// Open the directory store a config names and resume its recorded root
    pub fn open_dir(config: &HostConfig) -> Result<Self> {
        config.validate()?;
        let store = FileStore::open(config)?;
        let root = store.load_root()?.unwrap_or_else(Keccak256::empty_root);
        info!(dir = %config.store_dir.display(), root = %hex::encode(root), "opened store");

        Ok(Self::open(store, root).with_max_value_size(config.max_value_size))
    }

    /// Record the active root so the next process resumes from it
    pub fn persist_root(&self) -> Result<()> {
        self.store().save_root(&self.root())
    }
}

impl<F> TrieHost<CallbackStore<F>>
where
    F: Fn(&B256) -> Option<Vec<u8>>,
{
    /// Hand the change set to `persist`, then drop the local copies it covered.
    ///
    /// The accumulator is drained only after `persist` succeeds.
    pub fn flush<P>(&mut self, persist: P) -> Result<()>
    where
        P: FnOnce(&ChangeSet) -> Result<()>,
    {
        let changes = self.trie.changes();
        let count = changes.len();
        persist(changes).map_err(|e| e.with_operation("host::flush"))?;

        self.take_changes();
        self.trie.store_mut().release_persisted();
        debug!(changes = count, "flushed to host");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpt_trie::{ErrorKind, MemoryStore, EMPTY_ROOT};
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[test]
    fn test_host_lifecycle() {
        let mut host = TrieHost::new(MemoryStore::new());
        assert_eq!(host.root(), EMPTY_ROOT);

        host.insert(b"dog", b"puppy").unwrap();
        host.insert(b"do", b"verb").unwrap();
        assert_eq!(host.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert!(host.contains(b"do").unwrap());
        assert!(!host.contains(b"doge").unwrap());

        let view = host.export_tree().unwrap();
        assert_eq!(view.root(), host.root());
        assert_eq!(view.entries().len(), 2);

        host.remove(b"dog").unwrap();
        host.remove(b"do").unwrap();
        assert_eq!(host.root(), EMPTY_ROOT);
    }

    #[test]
    fn test_take_changes() {
        let mut host = TrieHost::new(MemoryStore::new());
        host.insert(b"hello", b"world").unwrap();

        let changes = host.take_changes();
        assert_eq!(changes.get(&host.root()).unwrap().ref_delta, 1);
        assert!(host.take_changes().is_empty());
    }

    #[test]
    fn test_value_size_limit() {
        let mut host = TrieHost::new(MemoryStore::new()).with_max_value_size(8);
        let err = host.insert(b"k", &[0; 9]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(host.root(), EMPTY_ROOT);

        host.insert(b"k", &[0; 8]).unwrap();
    }

    #[test]
    fn test_open_dir_resumes_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::default().with_store_dir(dir.path());

        let root = {
            let mut host = TrieHost::open_dir(&config).unwrap();
            host.insert(b"persistent", b"value").unwrap();
            host.persist_root().unwrap();
            host.root()
        };

        let host = TrieHost::open_dir(&config).unwrap();
        assert_eq!(host.root(), root);
        assert_eq!(host.get(b"persistent").unwrap(), Some(b"value".to_vec()));
    }

    fn persist_into(db: &mut HashMap<B256, Vec<u8>>, changes: &ChangeSet) {
        for (digest, change) in changes.iter() {
            if change.ref_delta > 0 {
                db.insert(*digest, change.encoded.clone());
            } else {
                db.remove(digest);
            }
        }
    }

    #[test]
    fn test_flush_to_host() {
        let persisted: RefCell<HashMap<B256, Vec<u8>>> = RefCell::new(HashMap::new());
        let mut host = TrieHost::new(CallbackStore::new(|d: &B256| persisted.borrow().get(d).cloned()));

        for i in 0..10u8 {
            host.insert(&[i, i], &[i + 1; 33]).unwrap();
        }
        host.flush(|changes| {
            persist_into(&mut persisted.borrow_mut(), changes);
            Ok(())
        })
        .unwrap();

        assert_eq!(host.store().pending(), 0);
        for i in 0..10u8 {
            assert_eq!(host.get(&[i, i]).unwrap(), Some(vec![i + 1; 33]));
        }

        // Mutations after a flush keep working against host-held nodes
        host.remove(&[3, 3]).unwrap();
        assert_eq!(host.get(&[3, 3]).unwrap(), None);
        assert_eq!(host.get(&[4, 4]).unwrap(), Some(vec![5; 33]));
    }

    #[test]
    fn test_failed_flush_keeps_changes() {
        let persisted: RefCell<HashMap<B256, Vec<u8>>> = RefCell::new(HashMap::new());
        let mut host = TrieHost::new(CallbackStore::new(|d: &B256| persisted.borrow().get(d).cloned()));
        host.insert(b"key", &[7; 40]).unwrap();
        let pending = host.store().pending();

        let err = host
            .flush(|_| Err(error::storage_failed("host database unavailable")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailed);
        assert_eq!(err.operation(), "host::flush");
        assert_eq!(host.store().pending(), pending);

        // Retry sees the same changes and leaves a readable trie behind
        let root = host.root();
        host.flush(|changes| {
            assert_eq!(changes.get(&root).map(|c| c.ref_delta), Some(1));
            persist_into(&mut persisted.borrow_mut(), changes);
            Ok(())
        })
        .unwrap();
        assert!(host.take_changes().is_empty());
        assert_eq!(host.store().pending(), 0);
        assert_eq!(host.get(b"key").unwrap(), Some(vec![7; 40]));
    }
}
