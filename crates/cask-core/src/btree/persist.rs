use super::{BTree, Node, Storer};
use crate::error::Result;

impl<K, P, V, S> BTree<K, P, V, S>
where
    K: Clone,
    P: Clone,
    V: Clone,
    S: Storer<K, P, V>,
{
    /// Copy the tree into `store` and return the new root pointer.
    ///
    /// Nodes are written post-order starting from the right-most leaf, so
    /// every child and every right sibling exists before the node that
    /// points to it. `store` only needs `put`; nothing is read back or
    /// updated, which suits a content-addressed store.
    pub fn persist<P2, S2>(&self, store: &S2) -> Result<P2>
    where
        P2: Clone,
        S2: Storer<K, P2, V>,
    {
        let root = self.store.get(&self.root)?;
        let mut last_leaf = None;
        self.persist_node(store, root, &mut last_leaf)
    }

    fn persist_node<P2, S2>(&self, store: &S2, node: Node<K, P, V>, last_leaf: &mut Option<P2>) -> Result<P2>
    where
        P2: Clone,
        S2: Storer<K, P2, V>,
    {
        if node.is_leaf() {
            let ptr = store.put(Node {
                keys: node.keys,
                pointers: Vec::new(),
                values: node.values,
                next: last_leaf.clone(),
            })?;
            *last_leaf = Some(ptr.clone());
            return Ok(ptr);
        }

        let mut pointers = Vec::with_capacity(node.pointers.len());
        for child_ptr in node.pointers.iter().rev() {
            let child = self.store.get(child_ptr)?;
            pointers.push(self.persist_node(store, child, last_leaf)?);
        }
        pointers.reverse();
        store.put(Node {
            keys: node.keys,
            pointers,
            values: Vec::new(),
            next: None,
        })
    }
}
