//! Weighted sampler over the active hosts.
//!
//! Hosts live in an implicit complete binary tree stored in a `Vec`: node `i`
//! has children `2i + 1` and `2i + 2`. Every node keeps its own weight and the
//! total weight of its subtree, so insert, remove, reweight and a single
//! weighted draw are all O(log n). Removal swaps the last node into the hole,
//! which keeps the tree complete.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::types::NetAddress;

#[derive(Debug, Clone)]
struct Node {
    address: NetAddress,
    weight: u128,
    /// Sum of weights in the subtree rooted here, including this node.
    total: u128,
}

/// Sum tree supporting weighted sampling without replacement.
#[derive(Debug, Default, Clone)]
pub struct HostTree {
    nodes: Vec<Node>,
    index: HashMap<NetAddress, usize>,
}

impl HostTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, address: &NetAddress) -> bool {
        self.index.contains_key(address)
    }

    pub fn total_weight(&self) -> u128 {
        self.nodes.first().map_or(0, |root| root.total)
    }

    pub fn weight(&self, address: &NetAddress) -> Option<u128> {
        let idx = *self.index.get(address)?;
        self.nodes.get(idx).map(|n| n.weight)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &NetAddress> {
        self.nodes.iter().map(|n| &n.address)
    }

    /// Insert a host, or reweight it if already present. Returns true if new.
    pub fn insert(&mut self, address: NetAddress, weight: u128) -> bool {
        if self.set_weight(&address, weight) {
            return false;
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            address: address.clone(),
            weight: 0,
            total: 0,
        });
        self.index.insert(address, idx);
        self.adjust_path(idx, weight, 0);
        if let Some(node) = self.nodes.get_mut(idx) {
            node.weight = weight;
        }
        true
    }

    /// Change the weight of a present host. Returns false if absent.
    pub fn set_weight(&mut self, address: &NetAddress, weight: u128) -> bool {
        let Some(&idx) = self.index.get(address) else {
            return false;
        };
        let Some(old) = self.nodes.get(idx).map(|n| n.weight) else {
            return false;
        };
        self.adjust_path(idx, weight, old);
        if let Some(node) = self.nodes.get_mut(idx) {
            node.weight = weight;
        }
        true
    }

    /// Remove a host, returning its weight if it was present.
    pub fn remove(&mut self, address: &NetAddress) -> Option<u128> {
        let idx = self.index.remove(address)?;
        let removed = self.nodes.get(idx)?.weight;
        self.adjust_path(idx, 0, removed);

        let last = self.nodes.len() - 1;
        if idx == last {
            self.nodes.pop();
            return Some(removed);
        }

        // Detach the last leaf and move it into the vacated slot.
        let moved_weight = self.nodes.get(last)?.weight;
        self.adjust_path(last, 0, moved_weight);
        let moved = self.nodes.pop()?;
        if let Some(slot) = self.nodes.get_mut(idx) {
            slot.address = moved.address.clone();
            slot.weight = moved_weight;
        }
        self.adjust_path(idx, moved_weight, 0);
        self.index.insert(moved.address, idx);
        Some(removed)
    }

    /// Draw up to `n` distinct hosts, each draw weighted by host weight,
    /// skipping any address in `exclude`.
    ///
    /// Drawn and excluded hosts are taken out of the tree while sampling and
    /// put back before returning. Zero-weight hosts are never drawn.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        n: usize,
        exclude: &HashSet<NetAddress>,
        rng: &mut R,
    ) -> Vec<NetAddress> {
        let mut taken: Vec<(NetAddress, u128)> = Vec::new();
        for address in exclude {
            if let Some(weight) = self.remove(address) {
                taken.push((address.clone(), weight));
            }
        }

        let mut drawn = Vec::with_capacity(n.min(self.len()));
        while drawn.len() < n {
            let Some(address) = self.draw(rng) else {
                break;
            };
            if let Some(weight) = self.remove(&address) {
                taken.push((address.clone(), weight));
            }
            drawn.push(address);
        }

        for (address, weight) in taken {
            self.insert(address, weight);
        }
        drawn
    }

    /// Single weighted draw without removal.
    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NetAddress> {
        let total = self.total_weight();
        if total == 0 {
            return None;
        }
        let mut r = rng.random_range(0..total);
        let mut i = 0;
        loop {
            let node = self.nodes.get(i)?;
            if r < node.weight {
                return Some(node.address.clone());
            }
            r -= node.weight;

            let left = 2 * i + 1;
            match self.nodes.get(left) {
                Some(l) if r < l.total => i = left,
                Some(l) => {
                    r -= l.total;
                    i = left + 1;
                }
                None => return None,
            }
        }
    }

    /// Add `add` and subtract `sub` from the subtree totals from `idx` up to the root.
    fn adjust_path(&mut self, mut idx: usize, add: u128, sub: u128) {
        loop {
            if let Some(node) = self.nodes.get_mut(idx) {
                node.total = node.total.saturating_add(add).saturating_sub(sub);
            }
            if idx == 0 {
                break;
            }
            idx = (idx - 1) / 2;
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.nodes.len(), self.index.len());
        for (i, node) in self.nodes.iter().enumerate() {
            assert_eq!(self.index.get(&node.address), Some(&i));
            let left = self.nodes.get(2 * i + 1).map_or(0, |n| n.total);
            let right = self.nodes.get(2 * i + 2).map_or(0, |n| n.total);
            assert_eq!(node.total, node.weight + left + right, "bad total at {i}");
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn addr(i: usize) -> NetAddress {
        NetAddress::new(format!("host{i}.example.com:9982"))
    }

    fn tree_with(weights: &[u128]) -> HostTree {
        let mut tree = HostTree::new();
        for (i, w) in weights.iter().enumerate() {
            tree.insert(addr(i), *w);
        }
        tree
    }

    #[test]
    fn test_insert_and_remove() {
        let mut tree = tree_with(&[5, 10, 15, 20]);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.total_weight(), 50);
        tree.assert_consistent();

        assert_eq!(tree.remove(&addr(1)), Some(10));
        assert_eq!(tree.total_weight(), 40);
        assert!(!tree.contains(&addr(1)));
        tree.assert_consistent();

        assert_eq!(tree.remove(&addr(1)), None);
        assert_eq!(tree.remove(&addr(3)), Some(20));
        assert_eq!(tree.remove(&addr(0)), Some(5));
        assert_eq!(tree.remove(&addr(2)), Some(15));
        assert!(tree.is_empty());
        assert_eq!(tree.total_weight(), 0);
    }

    #[test]
    fn test_insert_existing_reweights() {
        let mut tree = tree_with(&[5, 10]);
        assert!(!tree.insert(addr(0), 50));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.weight(&addr(0)), Some(50));
        assert_eq!(tree.total_weight(), 60);
        tree.assert_consistent();
    }

    #[test]
    fn test_sample_empty() {
        let mut tree = HostTree::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(tree.sample(5, &HashSet::new(), &mut rng).is_empty());
    }

    #[test]
    fn test_sample_more_than_available_returns_all() {
        let mut tree = tree_with(&[1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(7);
        let drawn = tree.sample(10, &HashSet::new(), &mut rng);
        assert_eq!(drawn.len(), 3);
        let unique: HashSet<_> = drawn.into_iter().collect();
        assert_eq!(unique.len(), 3);
        // Tree is restored after sampling.
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.total_weight(), 6);
        tree.assert_consistent();
    }

    #[test]
    fn test_sample_skips_zero_weight() {
        let mut tree = tree_with(&[0, 4]);
        let mut rng = StdRng::seed_from_u64(3);
        let drawn = tree.sample(2, &HashSet::new(), &mut rng);
        assert_eq!(drawn, vec![addr(1)]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_sample_is_weighted() {
        let mut tree = tree_with(&[1, 99]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut heavy_first = 0;
        for _ in 0..1_000 {
            let drawn = tree.sample(1, &HashSet::new(), &mut rng);
            if drawn.first() == Some(&addr(1)) {
                heavy_first += 1;
            }
        }
        assert!(heavy_first > 900, "heavy host drawn {heavy_first} times");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize, u128),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..32, 1u128..1_000).prop_map(|(i, w)| Op::Insert(i, w)),
            (0usize..32).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn test_totals_stay_consistent(ops in prop::collection::vec(op(), 0..200)) {
            let mut tree = HostTree::new();
            let mut model: HashMap<NetAddress, u128> = HashMap::new();
            for op in ops {
                match op {
                    Op::Insert(i, w) => {
                        tree.insert(addr(i), w);
                        model.insert(addr(i), w);
                    }
                    Op::Remove(i) => {
                        prop_assert_eq!(tree.remove(&addr(i)), model.remove(&addr(i)));
                    }
                }
                tree.assert_consistent();
            }
            prop_assert_eq!(tree.len(), model.len());
            prop_assert_eq!(tree.total_weight(), model.values().sum::<u128>());
        }

        #[test]
        fn test_sample_distinct_exact_and_respects_exclusion(
            weights in prop::collection::vec(1u128..1_000, 0..40),
            n in 0usize..50,
            excluded in prop::collection::hash_set(0usize..40, 0..10),
            seed in any::<u64>(),
        ) {
            let mut tree = tree_with(&weights);
            let exclude: HashSet<NetAddress> = excluded.iter().map(|i| addr(*i)).collect();
            let eligible = (0..weights.len()).filter(|i| !excluded.contains(i)).count();
            let mut rng = StdRng::seed_from_u64(seed);

            let drawn = tree.sample(n, &exclude, &mut rng);

            prop_assert_eq!(drawn.len(), n.min(eligible));
            let unique: HashSet<_> = drawn.iter().cloned().collect();
            prop_assert_eq!(unique.len(), drawn.len());
            prop_assert!(drawn.iter().all(|a| !exclude.contains(a)));
            prop_assert_eq!(tree.len(), weights.len());
            prop_assert_eq!(tree.total_weight(), weights.iter().sum::<u128>());
            tree.assert_consistent();
        }
    }
}
