//! Upward propagation of invalidation descriptors.
//!
//! Walks from the changed node to every ancestor with an explicit stack of
//! `(node, pending)` frames. At each frame a descriptor is:
//!
//! - kept pending, if the frame's node is the descriptor's origin;
//! - applied, if the node holds the cached key; it stays pending for the
//!   ancestors only when it propagates;
//! - dropped otherwise.
//!
//! Each parent receives its own copy of what is still pending, so one
//! ancestor path never affects another. The parent relation is acyclic and
//! every frame can only shrink its set, so the walk terminates.

use smallvec::SmallVec;
use tracing::trace;

use super::descriptor::{CacheKey, DescriptorSet};
use crate::graph::NodeKey;

/// Graph view the engine walks.
pub trait InvalidationTarget {
    /// Parents of `node`; empty for roots and unknown nodes.
    fn parents(&self, node: NodeKey) -> SmallVec<[NodeKey; 2]>;

    /// Whether `node` currently holds a value for `key`.
    fn holds(&self, node: NodeKey, key: CacheKey) -> bool;

    /// Clear the value of `key` on `node`.
    fn clear(&mut self, node: NodeKey, key: CacheKey);
}

/// What one propagation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Cleared values, in clearing order.
    pub cleared: Vec<(NodeKey, CacheKey)>,
    /// Frames processed.
    pub frames: usize,
}

impl InvalidationReport {
    pub fn is_empty(&self) -> bool {
        self.cleared.is_empty()
    }

    /// Whether `key` was cleared on `node`.
    pub fn cleared(&self, node: NodeKey, key: CacheKey) -> bool {
        self.cleared.contains(&(node, key))
    }

    /// Number of times `key` was cleared on `node`.
    pub fn count(&self, node: NodeKey, key: CacheKey) -> usize {
        self.cleared.iter().filter(|&&c| c == (node, key)).count()
    }
}

/// Propagate `pending` from `start` up through all ancestors.
pub fn propagate<T: InvalidationTarget + ?Sized>(
    target: &mut T,
    start: NodeKey,
    pending: DescriptorSet,
) -> InvalidationReport {
    let mut report = InvalidationReport::default();
    let mut stack: Vec<(NodeKey, DescriptorSet)> = vec![(start, pending)];

    while let Some((node, set)) = stack.pop() {
        report.frames += 1;
        let mut next = DescriptorSet::new();

        for d in &set {
            if d.origin == Some(node) {
                next.insert(*d);
            } else if target.holds(node, d.key) {
                target.clear(node, d.key);
                report.cleared.push((node, d.key));
                if d.propagating {
                    next.insert(*d);
                }
            }
        }

        trace!(node = %node, pending = set.len(), forwarded = next.len(), "invalidation frame");
        if next.is_empty() {
            continue;
        }
        for parent in target.parents(node) {
            stack.push((parent, next.clone()));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidate::Descriptor;
    use std::collections::{HashMap, HashSet};

    /// Stand-alone DAG for exercising the walk without a scene graph.
    #[derive(Default)]
    struct Dag {
        keys: Vec<NodeKey>,
        parents: HashMap<NodeKey, Vec<NodeKey>>,
        held: HashSet<(NodeKey, CacheKey)>,
    }

    impl Dag {
        fn with_nodes(n: usize) -> Self {
            let mut arena = crate::graph::SceneGraph::new();
            let keys = (0..n).map(|i| arena.create_node(format!("n{i}"))).collect();
            Self { keys, ..Default::default() }
        }

        fn edge(&mut self, parent: usize, child: usize) {
            let (p, c) = (self.keys[parent], self.keys[child]);
            self.parents.entry(c).or_default().push(p);
        }

        fn hold_all(&mut self, key: CacheKey) {
            for &k in &self.keys {
                self.held.insert((k, key));
            }
        }
    }

    impl InvalidationTarget for Dag {
        fn parents(&self, node: NodeKey) -> SmallVec<[NodeKey; 2]> {
            self.parents.get(&node).map(|v| v.iter().copied().collect()).unwrap_or_default()
        }

        fn holds(&self, node: NodeKey, key: CacheKey) -> bool {
            self.held.contains(&(node, key))
        }

        fn clear(&mut self, node: NodeKey, key: CacheKey) {
            self.held.remove(&(node, key));
        }
    }

    fn set(d: Descriptor) -> DescriptorSet {
        std::iter::once(d).collect()
    }

    #[test]
    fn test_diamond_clears_each_once() {
        // 0 is the root, 1 and 2 both hold 3.
        let mut dag = Dag::with_nodes(4);
        dag.edge(0, 1);
        dag.edge(0, 2);
        dag.edge(1, 3);
        dag.edge(2, 3);
        dag.hold_all(CacheKey::Bounds);
        let k = dag.keys.clone();

        let report = propagate(&mut dag, k[3], set(Descriptor::propagating(CacheKey::Bounds)));
        for &n in &k {
            assert_eq!(report.count(n, CacheKey::Bounds), 1, "node {n}");
        }
        assert!(dag.held.is_empty());
    }

    #[test]
    fn test_origin_is_skipped() {
        let mut dag = Dag::with_nodes(2);
        dag.edge(0, 1);
        dag.hold_all(CacheKey::Bounds);
        let k = dag.keys.clone();

        let d = Descriptor::propagating(CacheKey::Bounds).skipping(k[1]);
        let report = propagate(&mut dag, k[1], set(d));
        assert!(!report.cleared(k[1], CacheKey::Bounds));
        assert!(report.cleared(k[0], CacheKey::Bounds));
        assert!(dag.holds(k[1], CacheKey::Bounds));
    }

    #[test]
    fn test_local_stops_after_first_clear() {
        let mut dag = Dag::with_nodes(3);
        dag.edge(0, 1);
        dag.edge(1, 2);
        dag.hold_all(CacheKey::StructureKey);
        let k = dag.keys.clone();

        let report = propagate(&mut dag, k[2], set(Descriptor::local(CacheKey::StructureKey)));
        assert_eq!(report.cleared, vec![(k[2], CacheKey::StructureKey)]);
        assert!(dag.holds(k[1], CacheKey::StructureKey));
    }

    #[test]
    fn test_drop_when_not_held() {
        let mut dag = Dag::with_nodes(3);
        dag.edge(0, 1);
        dag.edge(1, 2);
        dag.hold_all(CacheKey::HasGeometry);
        let k = dag.keys.clone();
        dag.clear(k[1], CacheKey::HasGeometry);

        let report = propagate(&mut dag, k[2], set(Descriptor::propagating(CacheKey::HasGeometry)));
        assert_eq!(report.cleared, vec![(k[2], CacheKey::HasGeometry)]);
        assert!(dag.holds(k[0], CacheKey::HasGeometry));
    }

    #[test]
    fn test_paths_are_independent() {
        // 1 and 2 share child 3; 2 does not hold Bounds, so only 1's path
        // reaches the root 0.
        let mut dag = Dag::with_nodes(5);
        dag.edge(0, 1);
        dag.edge(4, 2);
        dag.edge(1, 3);
        dag.edge(2, 3);
        dag.hold_all(CacheKey::Bounds);
        let k = dag.keys.clone();
        dag.clear(k[2], CacheKey::Bounds);

        let report = propagate(&mut dag, k[3], set(Descriptor::propagating(CacheKey::Bounds)));
        assert!(report.cleared(k[0], CacheKey::Bounds));
        assert!(!report.cleared(k[4], CacheKey::Bounds));
        assert!(dag.holds(k[4], CacheKey::Bounds));
    }

    #[test]
    fn test_deep_chain_is_iterative() {
        let n = 100_000;
        let mut dag = Dag::with_nodes(n);
        for i in 1..n {
            dag.edge(i - 1, i);
        }
        dag.hold_all(CacheKey::Bounds);
        let last = dag.keys[n - 1];
        let report = propagate(&mut dag, last, set(Descriptor::propagating(CacheKey::Bounds)));
        assert_eq!(report.cleared.len(), n);
        assert_eq!(report.frames, n);
    }
}
