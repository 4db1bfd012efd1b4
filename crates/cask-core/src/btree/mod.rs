//! A generic B+tree over a pluggable node store.
//!
//! Trees are built in memory (see [`InMemoryStore`]) and then written once
//! through [`BTree::persist`] into a content-addressed store, where leaves
//! are linked left to right so scans never revisit internal nodes.

mod iter;
pub mod memstore;
mod persist;
pub mod repostore;
mod verify;

use std::cmp::Ordering;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};

pub use self::iter::Iter;
pub use self::memstore::InMemoryStore;
pub use self::repostore::RepositoryStore;

pub type Comparator<K> = fn(&K, &K) -> Ordering;

/// A tree under construction, before it is persisted.
pub type MemTree<K, V> = BTree<K, usize, V, InMemoryStore<K, V>>;

/// Node storage. Pointers are whatever the store hands out from `put`.
pub trait Storer<K, P, V> {
    fn get(&self, ptr: &P) -> Result<Node<K, P, V>>;
    /// Replace the node at `ptr`.
    fn update(&self, ptr: &P, node: Node<K, P, V>) -> Result<()>;
    fn put(&self, node: Node<K, P, V>) -> Result<P>;
}

/// Internal nodes carry keys and pointers (`pointers.len() == keys.len() + 1`).
/// Leaves carry keys and values (`values.len() == keys.len()`) and link
/// to their right sibling through `next`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<K, P, V> {
    pub keys: Vec<K>,
    pub pointers: Vec<P>,
    pub values: Vec<V>,
    pub next: Option<P>,
}

impl<K, P, V> Default for Node<K, P, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            pointers: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }
}

impl<K, P, V> Node<K, P, V> {
    pub fn is_leaf(&self) -> bool {
        self.pointers.is_empty()
    }
}

pub struct BTree<K, P, V, S> {
    order: usize,
    root: P,
    store: S,
    compare: Comparator<K>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, P, V, S> BTree<K, P, V, S>
where
    K: Clone,
    P: Clone,
    V: Clone,
    S: Storer<K, P, V>,
{
    /// An empty tree whose root leaf is allocated in `store`.
    pub fn new(store: S, compare: Comparator<K>, order: usize) -> Result<Self> {
        if order < 3 {
            return Err(CaskError::Config(format!("btree order must be at least 3 (got {order})")));
        }
        let root = store.put(Node::default())?;
        Ok(Self::from_root(root, store, compare, order))
    }

    /// Open an existing tree by its root pointer.
    pub fn from_root(root: P, store: S, compare: Comparator<K>, order: usize) -> Self {
        Self {
            order,
            root,
            store,
            compare,
            _marker: PhantomData,
        }
    }

    pub fn root(&self) -> &P {
        &self.root
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Descend to the leaf that would hold `key`, returning it along with
    /// the pointers visited from the root down to it.
    fn find_leaf(&self, key: &K) -> Result<(Node<K, P, V>, Vec<P>)> {
        let mut ptr = self.root.clone();
        let mut path = Vec::new();
        loop {
            let node = self.store.get(&ptr)?;
            path.push(ptr);
            if node.is_leaf() {
                return Ok((node, path));
            }
            let idx = node
                .keys
                .partition_point(|k| (self.compare)(k, key) != Ordering::Greater);
            ptr = node.pointers[idx.min(node.pointers.len() - 1)].clone();
        }
    }

    fn search(&self, keys: &[K], key: &K) -> std::result::Result<usize, usize> {
        keys.binary_search_by(|k| (self.compare)(k, key))
    }

    pub fn find(&self, key: &K) -> Result<Option<V>> {
        let (leaf, _) = self.find_leaf(key)?;
        match self.search(&leaf.keys, key) {
            Ok(idx) => leaf
                .values
                .get(idx)
                .cloned()
                .map(Some)
                .ok_or_else(|| malformed_leaf(leaf.keys.len(), leaf.values.len())),
            Err(_) => Ok(None),
        }
    }

    /// Insert a new key. Fails with [`CaskError::KeyExists`] if present.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let (mut leaf, mut path) = self.find_leaf(&key)?;
        let Some(leaf_ptr) = path.pop() else {
            return Err(CaskError::NodeNotFound("empty descent path".into()));
        };
        let idx = match self.search(&leaf.keys, &key) {
            Ok(_) => return Err(CaskError::KeyExists),
            Err(idx) => idx,
        };
        leaf.keys.insert(idx, key);
        leaf.values.insert(idx, value);
        if leaf.keys.len() < self.order {
            return self.store.update(&leaf_ptr, leaf);
        }

        let mid = leaf.keys.len() / 2;
        let right = Node {
            keys: leaf.keys.split_off(mid),
            pointers: Vec::new(),
            values: leaf.values.split_off(mid),
            next: leaf.next.take(),
        };
        let separator = right.keys[0].clone();
        let right_ptr = self.store.put(right)?;
        leaf.next = Some(right_ptr.clone());
        self.store.update(&leaf_ptr, leaf)?;
        self.insert_upwards(separator, right_ptr, path)
    }

    /// Add `(key, ptr)` to the parents along `path`, splitting as needed.
    fn insert_upwards(&mut self, mut key: K, mut ptr: P, mut path: Vec<P>) -> Result<()> {
        while let Some(parent_ptr) = path.pop() {
            let mut node = self.store.get(&parent_ptr)?;
            let idx = match self.search(&node.keys, &key) {
                Ok(_) => {
                    return Err(CaskError::InvalidFormat(
                        "btree: duplicate separator in internal node".into(),
                    ))
                }
                Err(idx) => idx,
            };
            node.keys.insert(idx, key);
            node.pointers.insert(idx + 1, ptr);
            if node.keys.len() < self.order {
                return self.store.update(&parent_ptr, node);
            }

            let mid = node.keys.len() / 2;
            let mut right_keys = node.keys.split_off(mid);
            let right_pointers = node.pointers.split_off(mid + 1);
            key = right_keys.remove(0);
            let right = Node {
                keys: right_keys,
                pointers: right_pointers,
                values: Vec::new(),
                next: None,
            };
            ptr = self.store.put(right)?;
            self.store.update(&parent_ptr, node)?;
        }

        let root = Node {
            keys: vec![key],
            pointers: vec![self.root.clone(), ptr],
            values: Vec::new(),
            next: None,
        };
        self.root = self.store.put(root)?;
        Ok(())
    }

    /// Number of entries, by walking the leaf chain.
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.scan_all()? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.scan_all()?.next().is_none())
    }

    /// Visit every node pointer, parents before children.
    pub fn visit_nodes(&self, visit: &mut dyn FnMut(&P) -> Result<()>) -> Result<()> {
        let mut pending = vec![self.root.clone()];
        while let Some(ptr) = pending.pop() {
            visit(&ptr)?;
            let node = self.store.get(&ptr)?;
            pending.extend(node.pointers.into_iter().rev());
        }
        Ok(())
    }
}

fn malformed_leaf(keys: usize, values: usize) -> CaskError {
    CaskError::InvalidFormat(format!("btree: leaf has {keys} keys but {values} values"))
}
