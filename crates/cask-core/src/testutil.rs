use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CaskError, Result};
use crate::storage::StorageBackend;

/// In-memory storage backend for tests.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
    range_reads: AtomicUsize,
    full_reads: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_range` calls served.
    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::Relaxed)
    }

    /// Number of whole-object `get` calls served.
    pub fn full_reads(&self) -> usize {
        self.full_reads.load(Ordering::Relaxed)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Overwrite a stored object in place, for corruption tests.
    pub fn tamper(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) {
        if let Some(bytes) = self.data.lock().get_mut(key) {
            f(bytes);
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.full_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.lock().get(key).cloned())
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        self.range_reads.fetch_add(1, Ordering::Relaxed);
        let map = self.data.lock();
        let Some(data) = map.get(key) else {
            return Ok(None);
        };
        let start = offset as usize;
        let end = start.saturating_add(length as usize);
        if end > data.len() {
            return Err(CaskError::InvalidFormat(format!(
                "short read on {key} at offset {offset}: expected {length} bytes, got {}",
                data.len().saturating_sub(start)
            )));
        }
        Ok(Some(data[start..end].to_vec()))
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.data.lock().get(key).map(|d| d.len() as u64))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.data.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn create_dir(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// Lets a test keep a handle on the backend a repository owns.
impl StorageBackend for Arc<MemoryBackend> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.as_ref().get(key)
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        self.as_ref().get_range(key, offset, length)
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        self.as_ref().size(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.as_ref().put(key, data)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.as_ref().delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.as_ref().exists(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.as_ref().list(prefix)
    }

    fn create_dir(&self, key: &str) -> Result<()> {
        self.as_ref().create_dir(key)
    }
}
