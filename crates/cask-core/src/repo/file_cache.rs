use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cask_types::Checksum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Filesystem metadata recorded for a file, used to skip re-reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCacheEntry {
    pub mtime_ns: i64,
    pub size: u64,
    pub dev: u64,
    pub ino: u64,
    pub object: Checksum,
    /// Unix seconds when the object was last computed from file content.
    pub cached_at: i64,
}

/// Maps absolute file paths to the object their content produced.
///
/// A hit requires every metadata field to match and the entry to be
/// younger than the TTL. Entries whose object is gone from the repository
/// must be pruned before a backup relies on the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCache {
    entries: HashMap<String, FileCacheEntry>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached object for `path`, if metadata matches and the entry is fresh.
    #[allow(clippy::too_many_arguments)]
    pub fn lookup(
        &self,
        path: &str,
        mtime_ns: i64,
        size: u64,
        dev: u64,
        ino: u64,
        ttl_secs: u64,
        now: i64,
    ) -> Option<&FileCacheEntry> {
        let entry = self.entries.get(path)?;
        let fresh = now.saturating_sub(entry.cached_at) < ttl_secs.min(i64::MAX as u64) as i64;
        let same = entry.mtime_ns == mtime_ns && entry.size == size && entry.dev == dev && entry.ino == ino;
        (fresh && same).then_some(entry)
    }

    pub fn insert(&mut self, path: String, entry: FileCacheEntry) {
        self.entries.insert(path, entry);
    }

    pub fn get(&self, path: &str) -> Option<&FileCacheEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove entries whose object is not in the repository.
    /// Returns the number of entries removed.
    pub fn prune_stale_entries(&mut self, object_exists: &dyn Fn(&Checksum) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_path, entry| object_exists(&entry.object));
        before - self.entries.len()
    }

    /// `<cache_dir>/cask/<repo-id>/filecache`, with the platform cache
    /// directory when no override is given.
    pub fn cache_path(repo_id: &Checksum, cache_dir: Option<&Path>) -> Option<PathBuf> {
        let base = match cache_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::cache_dir()?,
        };
        Some(base.join("cask").join(repo_id.to_hex()).join("filecache"))
    }

    /// Load from disk. A missing or unreadable cache starts empty.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(_) => return Self::new(),
        };
        match rmp_serde::from_slice(&data) {
            Ok(cache) => cache,
            Err(e) => {
                debug!("file cache: failed to deserialize: {e}, starting fresh");
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = rmp_serde::to_vec_named(self)?;
        debug!(entries = self.entries.len(), bytes = data.len(), "file cache serialized");
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: u64 = 3600;

    fn entry(object: u8) -> FileCacheEntry {
        FileCacheEntry {
            mtime_ns: 1_234_567_890,
            size: 4096,
            dev: 1,
            ino: 1000,
            object: Checksum([object; 32]),
            cached_at: 100,
        }
    }

    #[test]
    fn lookup_hit() {
        let mut cache = FileCache::new();
        cache.insert("/tmp/a".into(), entry(1));
        let hit = cache.lookup("/tmp/a", 1_234_567_890, 4096, 1, 1000, TTL, 200);
        assert_eq!(hit.map(|e| e.object), Some(Checksum([1; 32])));
    }

    #[test]
    fn lookup_miss_on_any_metadata_change() {
        let mut cache = FileCache::new();
        cache.insert("/tmp/a".into(), entry(1));
        assert!(cache.lookup("/tmp/b", 1_234_567_890, 4096, 1, 1000, TTL, 200).is_none());
        assert!(cache.lookup("/tmp/a", 9, 4096, 1, 1000, TTL, 200).is_none());
        assert!(cache.lookup("/tmp/a", 1_234_567_890, 4097, 1, 1000, TTL, 200).is_none());
        assert!(cache.lookup("/tmp/a", 1_234_567_890, 4096, 2, 1000, TTL, 200).is_none());
        assert!(cache.lookup("/tmp/a", 1_234_567_890, 4096, 1, 1001, TTL, 200).is_none());
    }

    #[test]
    fn lookup_miss_when_expired() {
        let mut cache = FileCache::new();
        cache.insert("/tmp/a".into(), entry(1));
        assert!(cache.lookup("/tmp/a", 1_234_567_890, 4096, 1, 1000, TTL, 100 + TTL as i64).is_none());
        assert!(cache.lookup("/tmp/a", 1_234_567_890, 4096, 1, 1000, 0, 100).is_none());
    }

    #[test]
    fn prune_removes_missing_objects() {
        let mut cache = FileCache::new();
        cache.insert("/a".into(), entry(1));
        cache.insert("/b".into(), entry(2));
        let removed = cache.prune_stale_entries(&|cs| *cs == Checksum([1; 32]));
        assert_eq!(removed, 1);
        assert!(cache.get("/a").is_some());
        assert!(cache.get("/b").is_none());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = FileCache::cache_path(&Checksum([7; 32]), Some(dir.path())).unwrap();
        assert!(path.ends_with(format!("cask/{}/filecache", Checksum([7; 32]).to_hex())));

        let mut cache = FileCache::new();
        cache.insert("/a".into(), entry(1));
        cache.save(&path).unwrap();

        let loaded = FileCache::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("/a"), Some(&entry(1)));
    }

    #[test]
    fn corrupt_cache_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filecache");
        std::fs::write(&path, b"\xc1garbage").unwrap();
        assert!(FileCache::load(&path).is_empty());
        assert!(FileCache::load(&dir.path().join("missing")).is_empty());
    }
}
