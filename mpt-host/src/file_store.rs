//! # File-backed node store
//!
//! One JSON document per node under `nodes/<hex digest>.json` holding the
//! hex encoded bytes and the reference count, plus `root.json` pointing at
//! the active root so a later process can pick the trie back up.
//!
//! A change set is applied all or nothing: every entry is read first, new
//! contents are staged as `nodes/<hex digest>.tmp`, and only then renamed
//! into place. A failure while swapping restores the entries already swapped.

use crate::config::HostConfig;
use crate::error::{self, Result};
use alloy_primitives::B256;
use mpt_trie::{ChangeSet, NodeStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const NODES_DIR: &str = "nodes";
const ROOT_FILE: &str = "root.json";
const STAGED_EXT: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeFile {
    encoded: String,
    refs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RootFile {
    root: String,
}

/// One change set entry, resolved against what is on disk
struct PlannedEntry {
    digest: B256,
    previous: Option<(Vec<u8>, i64)>,
    encoded: Vec<u8>,
    refs: i64,
    staged: Option<PathBuf>,
}

/// Directory-backed node store (persistent)
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create the store, creating directories as needed
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let nodes = base_path.join(NODES_DIR);
        std::fs::create_dir_all(&nodes).map_err(|e| error::io_error("create", &nodes, e))?;
        Ok(Self { base_path })
    }

    /// Open the store a config points at
    pub fn open(config: &HostConfig) -> Result<Self> {
        if !config.store_dir.exists() && !config.create_if_missing {
            return Err(error::store_not_found(&config.store_dir));
        }
        Self::new(&config.store_dir)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn node_path(&self, digest: &B256) -> PathBuf {
        self.base_path
            .join(NODES_DIR)
            .join(format!("{}.json", hex::encode(digest)))
    }

    fn staged_path(&self, digest: &B256) -> PathBuf {
        self.node_path(digest).with_extension(STAGED_EXT)
    }

    fn root_path(&self) -> PathBuf {
        self.base_path.join(ROOT_FILE)
    }

    fn read_entry(&self, digest: &B256) -> Result<Option<(Vec<u8>, i64)>> {
        let path = self.node_path(digest);
        if !path.is_file() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path).map_err(|e| error::io_error("read", &path, e))?;
        let entry: NodeFile = serde_json::from_str(&json).map_err(|e| {
            error::parse_error(format!("failed to parse node file {}: {}", path.display(), e))
                .with_context("path", path.display().to_string())
        })?;
        let encoded = hex::decode(&entry.encoded).map_err(|e| {
            error::parse_error(format!("node file {} is not hex: {}", path.display(), e))
                .with_context("path", path.display().to_string())
        })?;

        Ok(Some((encoded, entry.refs)))
    }

    fn write_entry(&self, digest: &B256, encoded: &[u8], refs: i64) -> Result<()> {
        self.write_node_file(&self.node_path(digest), encoded, refs)
    }

    fn write_node_file(&self, path: &Path, encoded: &[u8], refs: i64) -> Result<()> {
        let entry = NodeFile {
            encoded: hex::encode(encoded),
            refs,
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| error::serialization_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| error::io_error("write", path, e))
    }

    fn delete_entry(&self, digest: &B256) -> Result<()> {
        let path = self.node_path(digest);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| error::io_error("delete", &path, e))?;
        }
        Ok(())
    }

    /// Read every entry a change set touches and work out its new state
    fn plan(&self, changes: &ChangeSet) -> Result<Vec<PlannedEntry>> {
        changes
            .iter()
            .map(|(digest, change)| -> Result<PlannedEntry> {
                let previous = self.read_entry(digest)?;
                let (encoded, refs) = match &previous {
                    Some((bytes, refs)) => (bytes.clone(), refs + change.ref_delta),
                    None => (change.encoded.clone(), change.ref_delta),
                };
                if refs < 0 {
                    tracing::warn!(digest = %hex::encode(digest), refs, "reference count went negative");
                }
                Ok(PlannedEntry {
                    digest: *digest,
                    previous,
                    encoded,
                    refs,
                    staged: None,
                })
            })
            .collect()
    }

    /// Write the new contents of every surviving entry beside its node file
    fn stage(&self, plan: &mut [PlannedEntry]) -> Result<()> {
        for entry in plan.iter_mut().filter(|entry| entry.refs > 0) {
            let path = self.staged_path(&entry.digest);
            self.write_node_file(&path, &entry.encoded, entry.refs)?;
            entry.staged = Some(path);
        }
        Ok(())
    }

    /// Move one planned entry into place
    fn swap_in(&self, entry: &PlannedEntry) -> Result<()> {
        match &entry.staged {
            Some(staged) => {
                let path = self.node_path(&entry.digest);
                std::fs::rename(staged, &path).map_err(|e| error::io_error("rename", &path, e))
            }
            None => self.delete_entry(&entry.digest),
        }
    }

    /// Put an entry back the way `plan` found it
    fn restore(&self, entry: &PlannedEntry) {
        let restored = match &entry.previous {
            Some((encoded, refs)) => self.write_entry(&entry.digest, encoded, *refs),
            None => self.delete_entry(&entry.digest),
        };
        if let Err(e) = restored {
            tracing::warn!(digest = %hex::encode(entry.digest), error = %e, "failed to restore node file");
        }
    }

    fn discard_staged(&self, plan: &[PlannedEntry]) {
        for path in plan.iter().filter_map(|entry| entry.staged.as_ref()) {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove staged node file");
                }
            }
        }
    }

    fn apply_all(&self, changes: &ChangeSet) -> Result<()> {
        let mut plan = self.plan(changes)?;

        if let Err(e) = self.stage(&mut plan) {
            self.discard_staged(&plan);
            return Err(e);
        }

        for (swapped, entry) in plan.iter().enumerate() {
            if let Err(e) = self.swap_in(entry) {
                for done in &plan[..swapped] {
                    self.restore(done);
                }
                self.discard_staged(&plan[swapped..]);
                return Err(e);
            }
        }

        tracing::trace!(entries = plan.len(), "applied change set");
        Ok(())
    }

    /// Root recorded by the last [`FileStore::save_root`], if any
    pub fn load_root(&self) -> Result<Option<B256>> {
        let path = self.root_path();
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path).map_err(|e| error::io_error("read", &path, e))?;
        let file: RootFile = serde_json::from_str(&json)
            .map_err(|e| error::parse_error(format!("failed to parse {}: {}", path.display(), e)))?;
        let root = file
            .root
            .parse::<B256>()
            .map_err(|e| error::parse_error(format!("invalid root digest '{}': {}", file.root, e)))?;

        Ok(Some(root))
    }

    /// Record the active root
    pub fn save_root(&self, root: &B256) -> Result<()> {
        let path = self.root_path();
        let file = RootFile {
            root: format!("0x{}", hex::encode(root)),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| error::serialization_error(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| error::io_error("write", &path, e))
    }

    /// Digests of every stored node
    pub fn digests(&self) -> Result<Vec<B256>> {
        let dir = self.base_path.join(NODES_DIR);
        let entries = std::fs::read_dir(&dir).map_err(|e| error::io_error("list", &dir, e))?;

        Ok(entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                    path.file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| s.parse::<B256>().ok())
                } else {
                    None
                }
            })
            .collect())
    }
}

impl NodeStore for FileStore {
    fn load(&self, digest: &B256) -> mpt_trie::Result<Option<Vec<u8>>> {
        Ok(self.read_entry(digest)?.map(|(encoded, _)| encoded))
    }

    fn store(&mut self, digest: B256, encoded: &[u8], ref_delta: i64) -> mpt_trie::Result<()> {
        let (bytes, refs) = match self.read_entry(&digest)? {
            Some((bytes, refs)) => (bytes, refs + ref_delta),
            None => (encoded.to_vec(), ref_delta),
        };

        if refs <= 0 {
            if refs < 0 {
                tracing::warn!(digest = %hex::encode(digest), refs, "reference count went negative");
            }
            return self.delete_entry(&digest);
        }
        self.write_entry(&digest, &bytes, refs)
    }

    fn remove(&mut self, digest: &B256) -> mpt_trie::Result<()> {
        self.delete_entry(digest)
    }

    fn ref_count(&self, digest: &B256) -> mpt_trie::Result<i64> {
        Ok(self.read_entry(digest)?.map_or(0, |(_, refs)| refs))
    }

    fn apply(&mut self, changes: &ChangeSet) -> mpt_trie::Result<()> {
        self.apply_all(changes).map_err(|e| {
            error::storage_failed(format!("change set of {} entries not applied", changes.len()))
                .with_operation("file_store::apply")
                .set_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use mpt_trie::{ErrorKind, PatriciaTrie, EMPTY_ROOT};

    #[test]
    fn test_file_store_ref_counting() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path()).unwrap();
        let digest = keccak256(b"node");

        store.store(digest, b"node", 2).unwrap();
        assert_eq!(store.ref_count(&digest).unwrap(), 2);
        assert_eq!(store.load(&digest).unwrap(), Some(b"node".to_vec()));
        assert!(store.node_path(&digest).exists());

        store.store(digest, b"node", -2).unwrap();
        assert_eq!(store.load(&digest).unwrap(), None);
        assert!(!store.node_path(&digest).exists());
    }

    #[test]
    fn test_root_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.load_root().unwrap(), None);

        store.save_root(&EMPTY_ROOT).unwrap();
        assert_eq!(store.load_root().unwrap(), Some(EMPTY_ROOT));
    }

    #[test]
    fn test_trie_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let root = {
            let mut trie: PatriciaTrie<_> = PatriciaTrie::new(FileStore::new(dir.path()).unwrap());
            trie.insert(b"do", b"verb").unwrap();
            trie.insert(b"dog", b"puppy").unwrap();
            let root = trie.insert(b"horse", b"stallion").unwrap();
            trie.store().save_root(&root).unwrap();
            root
        };

        let store = FileStore::new(dir.path()).unwrap();
        let reopened = store.load_root().unwrap().unwrap();
        assert_eq!(reopened, root);

        let trie: PatriciaTrie<_> = PatriciaTrie::from_root(store, reopened);
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
    }

    #[test]
    fn test_remove_everything_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut trie: PatriciaTrie<_> = PatriciaTrie::new(FileStore::new(dir.path()).unwrap());
        for i in 0..20 {
            trie.insert(format!("key{}", i).as_bytes(), &[0x5a; 40]).unwrap();
        }
        assert!(!trie.store().digests().unwrap().is_empty());

        for i in 0..20 {
            trie.remove(format!("key{}", i).as_bytes()).unwrap();
        }
        assert!(trie.store().digests().unwrap().is_empty());
    }

    /// Trie over a file store plus an in-memory twin holding the same keys
    fn seeded(dir: &Path) -> (PatriciaTrie<FileStore>, PatriciaTrie<mpt_trie::MemoryStore>) {
        let mut trie: PatriciaTrie<_> = PatriciaTrie::new(FileStore::new(dir).unwrap());
        let mut twin = PatriciaTrie::new_memory();
        for i in 0..8u8 {
            trie.insert(&[i, 0x10], &[i; 40]).unwrap();
            twin.insert(&[i, 0x10], &[i; 40]).unwrap();
        }
        twin.checkpoint();
        (trie, twin)
    }

    #[test]
    fn test_failed_swap_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (mut trie, mut twin) = seeded(dir.path());
        let root = trie.root_hash();
        let before: Vec<(B256, i64)> = trie
            .store()
            .digests()
            .unwrap()
            .into_iter()
            .map(|d| (d, trie.store().ref_count(&d).unwrap()))
            .collect();

        twin.insert(&[3, 0x11], &[9; 40]).unwrap();
        let expected = twin.checkpoint();
        let written: Vec<B256> = expected.written().copied().collect();
        assert!(written.len() > 1);

        // A directory where the last node file would go makes the rename fail
        let blocked = *written.last().unwrap();
        std::fs::create_dir(trie.store().node_path(&blocked)).unwrap();
        std::fs::write(trie.store().node_path(&blocked).join("keep"), "x").unwrap();

        let err = trie.insert(&[3, 0x11], &[9; 40]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailed);
        assert_eq!(trie.root_hash(), root);
        for digest in &written[..written.len() - 1] {
            assert_eq!(trie.store().ref_count(digest).unwrap(), 0);
        }
        for (digest, refs) in &before {
            assert_eq!(trie.store().ref_count(digest).unwrap(), *refs);
        }
        assert!(trie.changes().get(&blocked).is_none());

        std::fs::remove_dir_all(trie.store().node_path(&blocked)).unwrap();
        assert_eq!(trie.insert(&[3, 0x11], &[9; 40]).unwrap(), twin.root_hash());
        assert_eq!(trie.get(&[3, 0x11]).unwrap(), Some(vec![9; 40]));
    }

    #[test]
    fn test_failed_staging_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut trie, mut twin) = seeded(dir.path());
        let root = trie.root_hash();
        let count = trie.store().digests().unwrap().len();

        twin.insert(&[5, 0x12], &[7; 40]).unwrap();
        let written: Vec<B256> = twin.checkpoint().written().copied().collect();
        let blocked = written[0];
        std::fs::create_dir(trie.store().staged_path(&blocked)).unwrap();

        let err = trie.insert(&[5, 0x12], &[7; 40]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailed);
        assert_eq!(trie.root_hash(), root);
        assert_eq!(trie.store().digests().unwrap().len(), count);
        for digest in &written {
            assert!(!trie.store().staged_path(digest).is_file());
        }
        assert_eq!(trie.get(&[5, 0x12]).unwrap(), None);
    }

    #[test]
    fn test_garbled_node_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let digest = keccak256(b"x");
        std::fs::write(store.node_path(&digest), "not json").unwrap();

        assert_eq!(store.load(&digest).unwrap_err().kind(), ErrorKind::ParseFailed);
    }

    #[test]
    fn test_open_respects_create_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let config = HostConfig {
            create_if_missing: false,
            ..HostConfig::default()
        }
        .with_store_dir(&missing);

        assert_eq!(FileStore::open(&config).unwrap_err().kind(), ErrorKind::FileNotFound);

        let config = config.with_store_dir(dir.path());
        assert!(FileStore::open(&config).is_ok());
    }
}
