//! # Node storage
//!
//! Content-addressed, reference-counted storage for encoded nodes. The trie
//! engine only talks to the [`NodeStore`] trait; reference counting and
//! physical deletion are the store's job.

use crate::error::{hex_digest, Result};
use alloy_primitives::B256;
use parking_lot::RwLock;
use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::sync::Arc;

/// Backing store for encoded trie nodes, keyed by digest
pub trait NodeStore {
    /// Get the encoded node stored under `digest`
    fn load(&self, digest: &B256) -> Result<Option<Vec<u8>>>;

    /// Add `ref_delta` to the entry's counter, creating it with `encoded`
    /// if absent. The entry is deleted once the counter drops to zero.
    fn store(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) -> Result<()>;

    /// Drop the entry regardless of its counter
    fn remove(&mut self, digest: &B256) -> Result<()>;

    /// Current counter, 0 when absent
    fn ref_count(&self, digest: &B256) -> Result<i64>;

    /// Apply a whole change set
    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        for (digest, change) in changes.iter() {
            self.store(*digest, &change.encoded, change.ref_delta)?;
        }
        Ok(())
    }
}

impl<S: NodeStore + ?Sized> NodeStore for Box<S> {
    fn load(&self, digest: &B256) -> Result<Option<Vec<u8>>> {
        (**self).load(digest)
    }

    fn store(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) -> Result<()> {
        (**self).store(digest, encoded, ref_delta)
    }

    fn remove(&mut self, digest: &B256) -> Result<()> {
        (**self).remove(digest)
    }

    fn ref_count(&self, digest: &B256) -> Result<i64> {
        (**self).ref_count(digest)
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        (**self).apply(changes)
    }
}

// =========================================
// Change sets
// =========================================

/// Net effect of one or more mutations on a single digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Signed reference count delta
    pub ref_delta: i64,
    /// Encoded node bytes
    pub encoded: Vec<u8>,
}

/// Digest-ordered accumulator of reference count deltas.
///
/// Deltas for the same digest are summed; entries that net to zero are
/// dropped so a node written and released within the same window leaves no
/// trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<B256, Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delta for `digest`
    pub fn record(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) {
        if ref_delta == 0 {
            return;
        }
        match self.changes.entry(digest) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(Change {
                    ref_delta,
                    encoded: encoded.to_vec(),
                });
            }
            btree_map::Entry::Occupied(mut slot) => {
                slot.get_mut().ref_delta += ref_delta;
                if slot.get().ref_delta == 0 {
                    slot.remove();
                }
            }
        }
    }

    /// Fold another change set into this one
    pub fn merge(&mut self, other: &ChangeSet) {
        for (digest, change) in other.iter() {
            self.record(*digest, &change.encoded, change.ref_delta);
        }
    }

    pub fn get(&self, digest: &B256) -> Option<&Change> {
        self.changes.get(digest)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&B256, &Change)> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Digests with a positive delta
    pub fn written(&self) -> impl Iterator<Item = &B256> {
        self.changes
            .iter()
            .filter(|(_, c)| c.ref_delta > 0)
            .map(|(d, _)| d)
    }

    /// Digests with a negative delta
    pub fn released(&self) -> impl Iterator<Item = &B256> {
        self.changes
            .iter()
            .filter(|(_, c)| c.ref_delta < 0)
            .map(|(d, _)| d)
    }
}

impl IntoIterator for ChangeSet {
    type Item = (B256, Change);
    type IntoIter = btree_map::IntoIter<B256, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

// =========================================
// In-memory store
// =========================================

#[derive(Debug, Clone)]
struct Entry {
    encoded: Vec<u8>,
    refs: i64,
}

/// In-memory node store (volatile, useful for testing)
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: HashMap<B256, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Digests of all live entries
    pub fn digests(&self) -> impl Iterator<Item = &B256> {
        self.nodes.keys()
    }

    /// Overwrite the bytes under a digest without touching its counter
    pub fn put_raw(&mut self, digest: B256, encoded: Vec<u8>) {
        self.nodes
            .entry(digest)
            .and_modify(|e| e.encoded = encoded.clone())
            .or_insert(Entry { encoded, refs: 1 });
    }
}

impl NodeStore for MemoryStore {
    fn load(&self, digest: &B256) -> Result<Option<Vec<u8>>> {
        Ok(self.nodes.get(digest).map(|e| e.encoded.clone()))
    }

    fn store(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) -> Result<()> {
        let entry = self.nodes.entry(digest).or_insert_with(|| Entry {
            encoded: encoded.to_vec(),
            refs: 0,
        });
        entry.refs += ref_delta;
        if entry.refs <= 0 {
            if entry.refs < 0 {
                tracing::warn!(digest = %hex_digest(&digest), refs = entry.refs, "reference count went negative");
            }
            self.nodes.remove(&digest);
        }
        Ok(())
    }

    fn remove(&mut self, digest: &B256) -> Result<()> {
        self.nodes.remove(digest);
        Ok(())
    }

    fn ref_count(&self, digest: &B256) -> Result<i64> {
        Ok(self.nodes.get(digest).map_or(0, |e| e.refs))
    }
}

// =========================================
// Shared store
// =========================================

/// Cloneable handle so several tries over different roots share one store
#[derive(Debug, Default)]
pub struct SharedStore<S> {
    inner: Arc<RwLock<S>>,
}

impl<S> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Run `f` with shared access to the underlying store
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` with exclusive access to the underlying store
    pub fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: NodeStore> NodeStore for SharedStore<S> {
    fn load(&self, digest: &B256) -> Result<Option<Vec<u8>>> {
        self.inner.read().load(digest)
    }

    fn store(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) -> Result<()> {
        self.inner.write().store(digest, encoded, ref_delta)
    }

    fn remove(&mut self, digest: &B256) -> Result<()> {
        self.inner.write().remove(digest)
    }

    fn ref_count(&self, digest: &B256) -> Result<i64> {
        self.inner.read().ref_count(digest)
    }

    // One lock for the whole set so other handles never see half of it
    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        self.inner.write().apply(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[test]
    fn test_memory_store_ref_counting() {
        let mut store = MemoryStore::new();
        let digest = keccak256(b"node");

        store.store(digest, b"node", 1).unwrap();
        store.store(digest, b"node", 1).unwrap();
        assert_eq!(store.ref_count(&digest).unwrap(), 2);
        assert_eq!(store.load(&digest).unwrap(), Some(b"node".to_vec()));

        store.store(digest, b"node", -1).unwrap();
        assert_eq!(store.ref_count(&digest).unwrap(), 1);

        store.store(digest, b"node", -1).unwrap();
        assert_eq!(store.ref_count(&digest).unwrap(), 0);
        assert_eq!(store.load(&digest).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_remove_purges() {
        let mut store = MemoryStore::new();
        let digest = keccak256(b"node");
        store.store(digest, b"node", 3).unwrap();
        store.remove(&digest).unwrap();
        assert_eq!(store.load(&digest).unwrap(), None);
        assert_eq!(store.ref_count(&digest).unwrap(), 0);
    }

    #[test]
    fn test_change_set_nets_out() {
        let a = keccak256(b"a");
        let b = keccak256(b"b");
        let mut changes = ChangeSet::new();

        changes.record(a, b"a", 1);
        changes.record(b, b"b", 1);
        changes.record(a, b"a", -1);

        assert_eq!(changes.len(), 1);
        assert!(changes.get(&a).is_none());
        assert_eq!(changes.get(&b).unwrap().ref_delta, 1);
        assert_eq!(changes.written().count(), 1);
        assert_eq!(changes.released().count(), 0);
    }

    #[test]
    fn test_change_set_merge_and_apply() {
        let a = keccak256(b"a");
        let b = keccak256(b"b");

        let mut first = ChangeSet::new();
        first.record(a, b"a", 2);
        let mut second = ChangeSet::new();
        second.record(a, b"a", -1);
        second.record(b, b"b", 1);
        first.merge(&second);

        assert_eq!(first.get(&a).unwrap().ref_delta, 1);

        let mut store = MemoryStore::new();
        store.apply(&first).unwrap();
        assert_eq!(store.ref_count(&a).unwrap(), 1);
        assert_eq!(store.ref_count(&b).unwrap(), 1);
    }

    #[test]
    fn test_shared_store_handles_see_each_other() {
        let mut one = SharedStore::new(MemoryStore::new());
        let two = one.clone();
        let digest = keccak256(b"x");

        one.store(digest, b"x", 1).unwrap();
        assert_eq!(two.load(&digest).unwrap(), Some(b"x".to_vec()));
        assert_eq!(two.read(|s| s.len()), 1);
    }
}
