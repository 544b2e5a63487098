//! Metric tree (BK-tree) over perceptual fingerprints.
//!
//! Every child edge is labelled with the Hamming distance between the child's
//! pivot and its parent's pivot. A radius query only descends into edges in
//! `[d - radius, d + radius]`, where `d` is the distance from the query to the
//! current pivot; the triangle inequality rules out everything else.

use crate::core::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("root node already present")]
    DuplicateRoot,

    #[error("node refers to unknown parent {parent}")]
    UnknownParent { parent: usize },

    #[error("edge {edge} does not match distance {actual} to parent {parent}")]
    EdgeMismatch {
        parent: usize,
        edge: u32,
        actual: u32,
    },

    #[error("parent {parent} already has a child at edge {edge}")]
    EdgeTaken { parent: usize, edge: u32 },
}

#[derive(Debug, Clone)]
struct Node {
    pivot: Fingerprint,
    parent: Option<(usize, u32)>,
    children: BTreeMap<u32, usize>,
}

impl Node {
    fn new(pivot: Fingerprint, parent: Option<(usize, u32)>) -> Self {
        Self {
            pivot,
            parent,
            children: BTreeMap::new(),
        }
    }
}

/// A fingerprint found by [`FingerprintIndex::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub fingerprint: &'a Fingerprint,
    pub distance: u32,
    /// Position of the fingerprint in insertion order.
    pub sequence: usize,
}

/// Nested export of the tree: a pivot and its children keyed by edge distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDump {
    pub pivot: Fingerprint,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<u32, NodeDump>,
}

/// Arena-backed BK-tree. Slot 0 is the root; a node's slot is its insertion
/// sequence, so parents always precede their children.
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    nodes: Vec<Node>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn insert(&mut self, fingerprint: Fingerprint) {
        if self.nodes.is_empty() {
            self.nodes.push(Node::new(fingerprint, None));
            return;
        }

        let mut current = 0;
        loop {
            let distance = self.nodes[current].pivot.distance(&fingerprint);
            match self.nodes[current].children.get(&distance) {
                Some(&child) => current = child,
                None => {
                    let slot = self.nodes.len();
                    self.nodes[current].children.insert(distance, slot);
                    self.nodes.push(Node::new(fingerprint, Some((current, distance))));
                    log::trace!(
                        "index: new node {} at edge {} under {}",
                        slot,
                        distance,
                        current
                    );
                    return;
                }
            }
        }
    }

    /// Every indexed fingerprint within `radius` of `fingerprint`.
    ///
    /// Children are visited in ascending edge order, so the result order is
    /// stable for a given tree.
    pub fn query(&self, fingerprint: &Fingerprint, radius: u32) -> Vec<Match<'_>> {
        let mut matches = Vec::new();
        if self.nodes.is_empty() {
            return matches;
        }

        let mut stack = vec![0usize];
        while let Some(slot) = stack.pop() {
            let node = &self.nodes[slot];
            let distance = node.pivot.distance(fingerprint);
            if distance <= radius {
                matches.push(Match {
                    fingerprint: &node.pivot,
                    distance,
                    sequence: slot,
                });
            }

            let low = distance.saturating_sub(radius);
            let high = distance.saturating_add(radius);
            // Reversed so the smallest edge is popped first.
            for (_, &child) in node.children.range(low..=high).rev() {
                stack.push(child);
            }
        }

        matches
    }

    /// Nested representation of the whole tree, `None` when empty.
    pub fn dump(&self) -> Option<NodeDump> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.dump_node(0))
        }
    }

    fn dump_node(&self, slot: usize) -> NodeDump {
        let node = &self.nodes[slot];
        NodeDump {
            pivot: node.pivot.clone(),
            children: node
                .children
                .iter()
                .map(|(&edge, &child)| (edge, self.dump_node(child)))
                .collect(),
        }
    }

    /// Nodes in slot order with their `(parent slot, edge)` link.
    pub(crate) fn links(&self) -> impl Iterator<Item = (&Fingerprint, Option<(usize, u32)>)> {
        self.nodes.iter().map(|node| (&node.pivot, node.parent))
    }

    /// Re-attach a node exactly where it was, checking the edge against the
    /// real distance. Nodes must arrive parent-first.
    pub(crate) fn restore(
        &mut self,
        link: Option<(usize, u32)>,
        fingerprint: Fingerprint,
    ) -> Result<(), RestoreError> {
        let slot = self.nodes.len();
        match link {
            None => {
                if !self.nodes.is_empty() {
                    return Err(RestoreError::DuplicateRoot);
                }
            }
            Some((parent, edge)) => {
                let parent_node = self
                    .nodes
                    .get_mut(parent)
                    .ok_or(RestoreError::UnknownParent { parent })?;
                let actual = parent_node.pivot.distance(&fingerprint);
                if actual != edge {
                    return Err(RestoreError::EdgeMismatch {
                        parent,
                        edge,
                        actual,
                    });
                }
                if parent_node.children.contains_key(&edge) {
                    return Err(RestoreError::EdgeTaken { parent, edge });
                }
                parent_node.children.insert(edge, slot);
            }
        }
        self.nodes.push(Node::new(fingerprint, link));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::{hamming_distance, HASH_BITS};

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
    }

    fn fp(hash: u64) -> Fingerprint {
        Fingerprint::new(hash, format!("{:016x}.jpg", hash))
    }

    fn sorted_hashes(matches: &[Match<'_>]) -> Vec<(u64, u32)> {
        let mut out: Vec<_> = matches
            .iter()
            .map(|m| (m.fingerprint.hash(), m.distance))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_empty_index_query() {
        let index = FingerprintIndex::new();
        assert!(index.is_empty());
        assert!(index.query(&fp(0), 0).is_empty());
        assert!(index.query(&fp(u64::MAX), HASH_BITS).is_empty());
        assert!(index.dump().is_none());
    }

    #[test]
    fn test_single_node_query() {
        let mut index = FingerprintIndex::new();
        index.insert(fp(0b1011));

        let hits = index.query(&fp(0b1011), 0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance, 0);

        assert!(index.query(&fp(0b0000), 2).is_empty());
        assert_eq!(index.query(&fp(0b0000), 3).len(), 1);
    }

    #[test]
    fn test_insert_builds_edges_by_distance() {
        let mut index = FingerprintIndex::new();
        index.insert(fp(0b0000));
        index.insert(fp(0b0001)); // edge 1 under root
        index.insert(fp(0b0011)); // edge 2 under root
        index.insert(fp(0b0010)); // edge 1 under root -> edge 2 under 0b0001

        let dump = index.dump().unwrap();
        assert_eq!(dump.pivot.hash(), 0b0000);
        let edges: Vec<u32> = dump.children.keys().copied().collect();
        assert_eq!(edges, vec![1, 2]);
        let one = &dump.children[&1];
        assert_eq!(one.pivot.hash(), 0b0001);
        assert_eq!(one.children[&2].pivot.hash(), 0b0010);
        assert!(one.children[&2].children.is_empty());
    }

    #[test]
    fn test_radius_zero_is_exact_match() {
        let mut index = FingerprintIndex::new();
        for hash in [1u64, 3, 7, 15, 1 << 40] {
            index.insert(fp(hash));
        }
        let hits = index.query(&fp(7), 0);
        assert_eq!(sorted_hashes(&hits), vec![(7, 0)]);
    }

    #[test]
    fn test_query_matches_linear_scan() {
        let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
        for round in 0..20 {
            let base = rng.next();
            let mut index = FingerprintIndex::new();
            let mut all = Vec::new();
            for _ in 0..200 {
                // Keep values clustered around a base so small radii still hit.
                let flips = rng.next() & rng.next() & rng.next();
                let hash = base ^ flips;
                all.push(hash);
                index.insert(fp(hash));
            }

            for radius in [0, 1, 3, 7, 12, 20, 64] {
                let target = if round % 2 == 0 {
                    all[radius as usize % all.len()]
                } else {
                    rng.next()
                };
                let mut expected: Vec<(u64, u32)> = all
                    .iter()
                    .map(|&h| (h, hamming_distance(h, target)))
                    .filter(|&(_, d)| d <= radius)
                    .collect();
                expected.sort();

                let got = sorted_hashes(&index.query(&fp(target), radius));
                assert_eq!(got, expected, "round {} radius {}", round, radius);
            }
        }
    }

    #[test]
    fn test_self_query_always_found() {
        let mut rng = XorShift(12345);
        let mut index = FingerprintIndex::new();
        let hashes: Vec<u64> = (0..100).map(|_| rng.next()).collect();
        for &h in &hashes {
            index.insert(fp(h));
        }
        for &h in &hashes {
            let hits = index.query(&fp(h), 0);
            assert!(
                hits.iter()
                    .any(|m| m.fingerprint.hash() == h && m.distance == 0)
            );
        }
    }

    #[test]
    fn test_query_visits_in_ascending_edge_order() {
        let mut index = FingerprintIndex::new();
        index.insert(fp(0));
        index.insert(fp(0b111)); // edge 3
        index.insert(fp(0b1)); // edge 1
        index.insert(fp(0b11)); // edge 2

        let order: Vec<u64> = index
            .query(&fp(0), 3)
            .iter()
            .map(|m| m.fingerprint.hash())
            .collect();
        assert_eq!(order, vec![0, 0b1, 0b11, 0b111]);
    }

    #[test]
    fn test_restore_rejects_bad_links() {
        let mut index = FingerprintIndex::new();
        index.restore(None, fp(0)).unwrap();
        assert_eq!(index.restore(None, fp(1)), Err(RestoreError::DuplicateRoot));
        assert_eq!(
            index.restore(Some((5, 1)), fp(1)),
            Err(RestoreError::UnknownParent { parent: 5 })
        );
        assert_eq!(
            index.restore(Some((0, 2)), fp(1)),
            Err(RestoreError::EdgeMismatch {
                parent: 0,
                edge: 2,
                actual: 1
            })
        );
        index.restore(Some((0, 1)), fp(1)).unwrap();
        assert_eq!(
            index.restore(Some((0, 1)), fp(2)),
            Err(RestoreError::EdgeTaken { parent: 0, edge: 1 })
        );
        assert_eq!(index.len(), 2);
    }
}
