use parking_lot::Mutex;

use super::{Node, Storer};
use crate::error::{CaskError, Result};

/// Keeps nodes in a vector; pointers are indices into it.
pub struct InMemoryStore<K, V> {
    nodes: Mutex<Vec<Node<K, usize, V>>>,
}

impl<K, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }
}

impl<K, V> InMemoryStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }
}

impl<K: Clone, V: Clone> Storer<K, usize, V> for InMemoryStore<K, V> {
    fn get(&self, ptr: &usize) -> Result<Node<K, usize, V>> {
        self.nodes
            .lock()
            .get(*ptr)
            .cloned()
            .ok_or_else(|| CaskError::NodeNotFound(ptr.to_string()))
    }

    fn update(&self, ptr: &usize, node: Node<K, usize, V>) -> Result<()> {
        let mut nodes = self.nodes.lock();
        let slot = nodes
            .get_mut(*ptr)
            .ok_or_else(|| CaskError::NodeNotFound(ptr.to_string()))?;
        *slot = node;
        Ok(())
    }

    fn put(&self, node: Node<K, usize, V>) -> Result<usize> {
        let mut nodes = self.nodes.lock();
        nodes.push(node);
        Ok(nodes.len() - 1)
    }
}
