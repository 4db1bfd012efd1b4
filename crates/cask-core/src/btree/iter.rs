use std::cmp::Ordering;
use std::marker::PhantomData;

use super::{BTree, Node, Storer};
use crate::error::Result;

/// Forward iterator over the leaf chain.
///
/// A store error is yielded once as `Err`, after which the iterator is
/// exhausted.
pub struct Iter<'a, K, P, V, S> {
    store: &'a S,
    node: Option<Node<K, P, V>>,
    idx: usize,
    _marker: PhantomData<P>,
}

impl<'a, K, P, V, S> Iter<'a, K, P, V, S> {
    fn new(store: &'a S, node: Node<K, P, V>, idx: usize) -> Self {
        Self {
            store,
            node: Some(node),
            idx,
            _marker: PhantomData,
        }
    }
}

impl<K, P, V, S> Iterator for Iter<'_, K, P, V, S>
where
    K: Clone,
    V: Clone,
    P: Clone,
    S: Storer<K, P, V>,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node.as_ref()?;
            if self.idx < node.keys.len() {
                let Some(value) = node.values.get(self.idx) else {
                    let err = super::malformed_leaf(node.keys.len(), node.values.len());
                    self.node = None;
                    return Some(Err(err));
                };
                let item = (node.keys[self.idx].clone(), value.clone());
                self.idx += 1;
                return Some(Ok(item));
            }
            let next = node.next.clone();
            self.node = None;
            match self.store.get(&next?) {
                Ok(node) => {
                    self.node = Some(node);
                    self.idx = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<K, P, V, S> BTree<K, P, V, S>
where
    K: Clone,
    P: Clone,
    V: Clone,
    S: Storer<K, P, V>,
{
    /// Iterate every entry in key order.
    pub fn scan_all(&self) -> Result<Iter<'_, K, P, V, S>> {
        let mut node = self.store.get(&self.root)?;
        while !node.is_leaf() {
            node = self.store.get(&node.pointers[0])?;
        }
        Ok(Iter::new(&self.store, node, 0))
    }

    /// Iterate entries from `key`, or the first key after it, onwards.
    pub fn scan_from(&self, key: &K) -> Result<Iter<'_, K, P, V, S>> {
        let (leaf, _) = self.find_leaf(key)?;
        let idx = leaf
            .keys
            .partition_point(|k| (self.compare)(k, key) == Ordering::Less);
        Ok(Iter::new(&self.store, leaf, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{InMemoryStore, MemTree, Node, Storer};
    use super::*;
    use crate::error::CaskError;

    fn build(keys: impl IntoIterator<Item = u32>, order: usize) -> MemTree<u32, u32> {
        let mut t: MemTree<u32, u32> = BTree::new(InMemoryStore::new(), u32::cmp, order).unwrap();
        for k in keys {
            t.insert(k, k + 1000).unwrap();
        }
        t
    }

    #[test]
    fn scan_all_is_sorted() {
        let t = build((0..200u32).rev(), 4);
        let keys: Vec<u32> = t.scan_all().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn scan_from_existing_and_missing_keys() {
        let t = build((0..100u32).map(|k| k * 2), 5);
        let from_exact: Vec<u32> = t.scan_from(&50).unwrap().map(|r| r.unwrap().0).take(3).collect();
        assert_eq!(from_exact, vec![50, 52, 54]);
        let from_gap: Vec<u32> = t.scan_from(&51).unwrap().map(|r| r.unwrap().0).take(2).collect();
        assert_eq!(from_gap, vec![52, 54]);
        assert_eq!(t.scan_from(&1000).unwrap().count(), 0);
        assert_eq!(t.scan_from(&0).unwrap().count(), 100);
    }

    /// Serves nodes from an inner store but fails on one pointer.
    struct FailingStore {
        inner: InMemoryStore<u32, u32>,
        broken: usize,
    }

    impl Storer<u32, usize, u32> for FailingStore {
        fn get(&self, ptr: &usize) -> Result<Node<u32, usize, u32>> {
            if *ptr == self.broken {
                return Err(CaskError::NodeNotFound(ptr.to_string()));
            }
            self.inner.get(ptr)
        }
        fn update(&self, ptr: &usize, node: Node<u32, usize, u32>) -> Result<()> {
            self.inner.update(ptr, node)
        }
        fn put(&self, node: Node<u32, usize, u32>) -> Result<usize> {
            self.inner.put(node)
        }
    }

    #[test]
    fn fetch_error_is_yielded_once() {
        let t = build(0..10u32, 3);
        let store = FailingStore {
            inner: InMemoryStore::new(),
            broken: usize::MAX,
        };
        let root: usize = t.persist(&store.inner).unwrap();

        // Find the second leaf and break it.
        let first_leaf = {
            let mut node = store.inner.get(&root).unwrap();
            while !node.is_leaf() {
                node = store.inner.get(&node.pointers[0]).unwrap();
            }
            node
        };
        let store = FailingStore {
            broken: first_leaf.next.unwrap(),
            ..store
        };
        let broken = BTree::from_root(root, store, u32::cmp, 3);

        let mut iter = broken.scan_all().unwrap();
        let mut ok = 0;
        let mut errors = 0;
        for item in iter.by_ref() {
            match item {
                Ok(_) => ok += 1,
                Err(_) => errors += 1,
            }
        }
        assert_eq!(ok, first_leaf.keys.len());
        assert_eq!(errors, 1);
        assert!(iter.next().is_none());
    }
}
