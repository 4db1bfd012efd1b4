use std::num::NonZeroUsize;

use cask_types::Checksum;
use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Node, Storer};
use crate::error::{CaskError, Result};
use crate::repo::{BlobType, Repository};

const NODE_CACHE_SIZE: usize = 256;

/// Stores tree nodes as blobs of one type inside a repository.
///
/// Nodes are content-addressed, so an existing node can never be changed:
/// `update` always fails. A read-only store also refuses `put`.
pub struct RepositoryStore<'a, K, V> {
    repo: &'a Repository,
    blob_type: BlobType,
    read_only: bool,
    cache: Mutex<LruCache<Checksum, Node<K, Checksum, V>>>,
}

impl<'a, K, V> RepositoryStore<'a, K, V> {
    pub fn new(repo: &'a Repository, blob_type: BlobType) -> Self {
        Self::with_mode(repo, blob_type, false)
    }

    pub fn read_only(repo: &'a Repository, blob_type: BlobType) -> Self {
        Self::with_mode(repo, blob_type, true)
    }

    fn with_mode(repo: &'a Repository, blob_type: BlobType, read_only: bool) -> Self {
        let size = NonZeroUsize::new(NODE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            repo,
            blob_type,
            read_only,
            cache: Mutex::new(LruCache::new(size)),
        }
    }

    pub fn blob_type(&self) -> BlobType {
        self.blob_type
    }
}

impl<K, V> Storer<K, Checksum, V> for RepositoryStore<'_, K, V>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    fn get(&self, ptr: &Checksum) -> Result<Node<K, Checksum, V>> {
        if let Some(node) = self.cache.lock().get(ptr) {
            return Ok(node.clone());
        }
        let data = self.repo.get_blob(self.blob_type, ptr)?;
        let node: Node<K, Checksum, V> = rmp_serde::from_slice(&data)?;
        self.cache.lock().put(*ptr, node.clone());
        Ok(node)
    }

    fn update(&self, _ptr: &Checksum, _node: Node<K, Checksum, V>) -> Result<()> {
        Err(CaskError::ReadOnly)
    }

    fn put(&self, node: Node<K, Checksum, V>) -> Result<Checksum> {
        if self.read_only {
            return Err(CaskError::ReadOnly);
        }
        let data = rmp_serde::to_vec_named(&node)?;
        let checksum = Checksum::compute(&data);
        self.repo.put_blob(self.blob_type, checksum, &data)?;
        Ok(checksum)
    }
}
