//! # Callback-backed node store
//!
//! The embedder owns persistence. Nodes are fetched lazily through a
//! callback; nodes the trie writes are held locally until the embedder has
//! drained the change set and persisted them, after which
//! [`CallbackStore::release_persisted`] drops the local copies.

use alloy_primitives::B256;
use mpt_trie::{MemoryStore, NodeStore, Result};

/// Node store that reads through a host-supplied fetch function
pub struct CallbackStore<F> {
    fetch: F,
    local: MemoryStore,
}

impl<F> CallbackStore<F>
where
    F: Fn(&B256) -> Option<Vec<u8>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            local: MemoryStore::new(),
        }
    }

    /// Nodes written since the last release
    pub fn pending(&self) -> usize {
        self.local.len()
    }

    /// Forget local copies once the host holds them
    pub fn release_persisted(&mut self) {
        tracing::debug!(nodes = self.local.len(), "releasing persisted nodes");
        self.local = MemoryStore::new();
    }
}

impl<F> std::fmt::Debug for CallbackStore<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackStore")
            .field("pending", &self.local.len())
            .finish_non_exhaustive()
    }
}

impl<F> NodeStore for CallbackStore<F>
where
    F: Fn(&B256) -> Option<Vec<u8>>,
{
    fn load(&self, digest: &B256) -> Result<Option<Vec<u8>>> {
        if let Some(encoded) = self.local.load(digest)? {
            return Ok(Some(encoded));
        }
        Ok((self.fetch)(digest))
    }

    fn store(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) -> Result<()> {
        // Releases of host-held nodes only reach the host through the change set
        if ref_delta < 0 && self.local.ref_count(&digest)? == 0 {
            return Ok(());
        }
        self.local.store(digest, encoded, ref_delta)
    }

    fn remove(&mut self, digest: &B256) -> Result<()> {
        self.local.remove(digest)
    }

    fn ref_count(&self, digest: &B256) -> Result<i64> {
        self.local.ref_count(digest)
    }
}
