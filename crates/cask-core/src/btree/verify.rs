use std::cmp::Ordering;
use std::fmt::Debug;

use super::{BTree, Storer};
use crate::error::{CaskError, Result};

fn corrupt(msg: String) -> CaskError {
    CaskError::InvalidFormat(format!("btree: {msg}"))
}

#[derive(Default)]
struct Walk {
    leaf_depth: Option<usize>,
    entries: usize,
}

impl<K, P, V, S> BTree<K, P, V, S>
where
    K: Clone + Debug,
    P: Clone + Debug,
    V: Clone,
    S: Storer<K, P, V>,
{
    /// Check structural invariants: node capacity and arity, key order
    /// within nodes and against parent separators, uniform leaf depth, and
    /// a leaf chain that visits every entry in strictly increasing order.
    pub fn verify(&self) -> Result<()> {
        let mut walk = Walk::default();
        self.verify_node(&self.root, 0, None, None, &mut walk)?;

        let mut previous: Option<K> = None;
        let mut chained = 0usize;
        for item in self.scan_all()? {
            let (key, _) = item?;
            if let Some(prev) = &previous {
                if (self.compare)(prev, &key) != Ordering::Less {
                    return Err(corrupt(format!("leaf chain inversion: {prev:?} then {key:?}")));
                }
            }
            previous = Some(key);
            chained += 1;
        }
        if chained != walk.entries {
            return Err(corrupt(format!(
                "leaf chain visits {chained} entries, tree holds {}",
                walk.entries
            )));
        }
        Ok(())
    }

    fn verify_node(&self, ptr: &P, depth: usize, lo: Option<&K>, hi: Option<&K>, walk: &mut Walk) -> Result<()> {
        let node = self.store.get(ptr)?;
        if node.keys.len() >= self.order {
            return Err(corrupt(format!(
                "node {ptr:?} holds {} keys, order is {}",
                node.keys.len(),
                self.order
            )));
        }
        for pair in node.keys.windows(2) {
            if (self.compare)(&pair[0], &pair[1]) != Ordering::Less {
                return Err(corrupt(format!("node {ptr:?}: {:?} not below {:?}", pair[0], pair[1])));
            }
        }
        for key in &node.keys {
            let above_lo = lo.map_or(true, |lo| (self.compare)(lo, key) != Ordering::Greater);
            let below_hi = hi.map_or(true, |hi| (self.compare)(key, hi) == Ordering::Less);
            if !above_lo || !below_hi {
                return Err(corrupt(format!("node {ptr:?}: key {key:?} outside separator bounds")));
            }
        }

        if node.is_leaf() {
            if node.values.len() != node.keys.len() {
                return Err(corrupt(format!(
                    "leaf {ptr:?} has {} keys and {} values",
                    node.keys.len(),
                    node.values.len()
                )));
            }
            if depth > 0 && node.keys.is_empty() {
                return Err(corrupt(format!("leaf {ptr:?} is empty")));
            }
            match walk.leaf_depth {
                None => walk.leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(corrupt(format!("leaf {ptr:?} at depth {depth}, expected {d}")));
                }
                Some(_) => {}
            }
            walk.entries += node.keys.len();
            return Ok(());
        }

        if node.pointers.len() != node.keys.len() + 1 || !node.values.is_empty() {
            return Err(corrupt(format!(
                "internal node {ptr:?} has {} keys, {} pointers and {} values",
                node.keys.len(),
                node.pointers.len(),
                node.values.len()
            )));
        }
        if node.next.is_some() {
            return Err(corrupt(format!("internal node {ptr:?} has a sibling link")));
        }
        for (i, child) in node.pointers.iter().enumerate() {
            let child_lo = if i == 0 { lo } else { Some(&node.keys[i - 1]) };
            let child_hi = if i == node.keys.len() { hi } else { Some(&node.keys[i]) };
            self.verify_node(child, depth + 1, child_lo, child_hi, walk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{InMemoryStore, MemTree, Node};
    use super::*;

    fn build(n: u32, order: usize) -> MemTree<u32, u32> {
        let mut t: MemTree<u32, u32> = BTree::new(InMemoryStore::new(), u32::cmp, order).unwrap();
        for k in 0..n {
            t.insert((k * 7919) % n, k).unwrap();
        }
        t
    }

    #[test]
    fn valid_trees_pass() {
        for order in [3, 4, 5, 10, 50] {
            build(500, order).verify().unwrap();
        }
    }

    #[test]
    fn detects_unsorted_leaf() {
        let t = build(3, 10);
        let mut root = t.store().get(t.root()).unwrap();
        root.keys.swap(0, 2);
        t.store().update(t.root(), root).unwrap();
        assert!(matches!(t.verify(), Err(CaskError::InvalidFormat(_))));
    }

    #[test]
    fn detects_arity_mismatch() {
        let t = build(3, 10);
        let mut root = t.store().get(t.root()).unwrap();
        root.values.pop();
        t.store().update(t.root(), root).unwrap();
        assert!(t.verify().is_err());
    }

    #[test]
    fn detects_overfull_node() {
        let t = build(2, 3);
        let root: Node<u32, usize, u32> = Node {
            keys: vec![0, 1, 2],
            pointers: Vec::new(),
            values: vec![0, 1, 2],
            next: None,
        };
        t.store().update(t.root(), root).unwrap();
        assert!(t.verify().is_err());
    }

    #[test]
    fn detects_separator_violation() {
        let t = build(20, 3);
        let root = t.store().get(t.root()).unwrap();
        // Move a small key into the right-most subtree.
        let mut leaf_ptr = *root.pointers.last().unwrap();
        let mut cur = t.store().get(&leaf_ptr).unwrap();
        while !cur.is_leaf() {
            leaf_ptr = cur.pointers[0];
            cur = t.store().get(&leaf_ptr).unwrap();
        }
        cur.keys[0] = 0;
        t.store().update(&leaf_ptr, cur).unwrap();
        assert!(t.verify().is_err());
    }
}
