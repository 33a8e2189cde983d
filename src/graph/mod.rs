//! Multi-parent component node graph.
//!
//! Nodes live in a generation-checked arena and refer to each other by
//! [`NodeKey`]. A node may have any number of parents; the parent relation
//! is kept acyclic by rejecting self-parenting and any edge that would
//! close a cycle. A node with no parents left is destroyed unless pinned
//! (document roots are pinned).
//!
//! Nodes decoded from a [`Document`](crate::object::Document) load their
//! children lazily, on first access. Every mutation runs the invalidation
//! engine so derived caches never go stale.

mod arena;
mod build;
mod component;
mod feature;
mod node;
mod query;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

pub use arena::NodeKey;
pub use component::{
    Component, ComponentKind, InstanceComponent, MaterialComponent, MeshComponent, PropertiesComponent,
};
pub use feature::{Feature, FeatureIndex};
pub use node::{Node, Origin};

use self::arena::NodeArena;
use crate::invalidate::{propagate, CacheKey, DescriptorSet, InvalidationReport, InvalidationTarget};
use crate::object::{DocumentId, ObjectHandle};
use crate::util::{InvariantViolation, Result, Transform};

/// The scene graph.
#[derive(Default)]
pub struct SceneGraph {
    nodes: NodeArena,
    /// Node decoded from each document object; shared descendants map to
    /// one node.
    by_object: HashMap<(DocumentId, ObjectHandle), NodeKey>,
    roots: Vec<NodeKey>,
    last_invalidation: InvalidationReport,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains(key)
    }

    /// Roots of loaded documents, in load order.
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node> {
        self.nodes.get(key).ok_or_else(|| InvariantViolation::StaleNode(key).into())
    }

    /// All live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.nodes.iter()
    }

    /// Report of the most recent invalidation.
    pub fn last_invalidation(&self) -> &InvalidationReport {
        &self.last_invalidation
    }

    /// Create a detached node.
    pub fn create_node(&mut self, id: impl Into<String>) -> NodeKey {
        let id: String = id.into();
        self.nodes.insert(Node::new(id))
    }

    /// Keep `key` alive even without parents.
    pub fn pin(&mut self, key: NodeKey) -> Result<()> {
        self.node_mut(key)?.pinned = true;
        Ok(())
    }

    pub fn unpin(&mut self, key: NodeKey) -> Result<()> {
        self.node_mut(key)?.pinned = false;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Add `child` under `parent`; returns the child's name there.
    ///
    /// A name already taken under `parent` is replaced by `{id}_{n}` with
    /// the smallest free `n`. Adding an existing edge again returns its
    /// name. Self-parenting and cycles are rejected without changing the
    /// graph.
    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<String> {
        self.node(child)?;
        self.node(parent)?;
        if parent == child {
            return Err(InvariantViolation::SelfParent(parent).into());
        }
        self.ensure_children(parent)?;

        if let Some(name) = self.node(parent)?.name_of(child) {
            return Ok(name.to_string());
        }
        // A node without children is nobody's ancestor.
        if !self.node(child)?.children.is_empty() && self.is_ancestor(child, parent) {
            return Err(InvariantViolation::Cycle { parent, child }.into());
        }

        let name = self.link(parent, child);
        trace!(parent = %parent, child = %child, name = %name, "added child");
        self.invalidate(parent, DescriptorSet::structural());
        Ok(name.to_string())
    }

    /// Remove the child named `name` from `parent`; returns the child key.
    ///
    /// The child is destroyed, with every descendant left without parents,
    /// once its last parent is gone, unless it is pinned.
    pub fn remove_child(&mut self, parent: NodeKey, name: &str) -> Result<NodeKey> {
        self.ensure_children(parent)?;
        let child = self
            .node_mut(parent)?
            .detach(name)
            .ok_or_else(|| InvariantViolation::MissingChild { node: parent, id: name.to_string() })?;

        let orphaned = match self.nodes.get_mut(child) {
            Some(node) => {
                if let Some(i) = node.parents.iter().position(|&p| p == parent) {
                    node.parents.remove(i);
                }
                node.parents.is_empty() && !node.pinned
            }
            None => false,
        };
        if orphaned {
            self.destroy(child);
        }
        self.invalidate(parent, DescriptorSet::structural());
        Ok(child)
    }

    /// Detach `key` from all parents and destroy it with its orphaned
    /// descendants, pinned or not.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<()> {
        let parents = self.node(key)?.parents.clone();
        for &parent in &parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                if let Some(name) = p.name_of(key).cloned() {
                    p.detach(&name);
                }
            }
        }
        self.destroy(key);
        for parent in parents {
            self.invalidate(parent, DescriptorSet::structural());
        }
        Ok(())
    }

    /// Whether `ancestor` is `node` or reachable from it through parents.
    pub fn is_ancestor(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut stack = vec![node];
        let mut seen = HashSet::new();
        while let Some(k) = stack.pop() {
            if k == ancestor {
                return true;
            }
            if !seen.insert(k) {
                continue;
            }
            if let Some(n) = self.nodes.get(k) {
                stack.extend(n.parents.iter().copied());
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach `component` to `key`.
    ///
    /// Rejected when another component already provides one of its
    /// features, or when it provides children to a node that already has
    /// some. A component that breaks the backing link first loads any
    /// pending children, then detaches the node from its document.
    pub fn add_component(&mut self, key: NodeKey, component: Component) -> Result<()> {
        let kind = component.kind();
        let node = self.node(key)?;
        if let Some((feature, owner)) = node.features.conflict(kind) {
            return Err(InvariantViolation::FeatureConflict { node: key, feature: feature.name(), owner: owner.name() }
                .into());
        }
        if kind.features().contains(&Feature::Children) && node.expected_children() > 0 {
            return Err(InvariantViolation::FeatureConflict {
                node: key,
                feature: Feature::Children.name(),
                owner: "existing children",
            }
            .into());
        }

        if kind.breaks_backing_link() && node.is_backed() {
            self.ensure_children(key)?;
            self.node_mut(key)?.backing = None;
            debug!(node = %key, component = %kind, "backing link broken");
        }

        let node = self.node_mut(key)?;
        node.components.insert(kind, component);
        node.rebuild_features();
        self.invalidate(key, kind.descriptors(key));
        Ok(())
    }

    /// Detach and return the component of `kind`.
    pub fn remove_component(&mut self, key: NodeKey, kind: ComponentKind) -> Result<Component> {
        let node = self.node_mut(key)?;
        let component = node
            .components
            .remove(&kind)
            .ok_or(InvariantViolation::MissingComponent { node: key, kind: kind.name() })?;
        node.rebuild_features();
        self.invalidate(key, kind.descriptors(key));
        Ok(component)
    }

    /// Mutate the component of `kind` in place, then invalidate.
    ///
    /// `f` must keep the component's kind.
    pub fn update_component<R>(
        &mut self,
        key: NodeKey,
        kind: ComponentKind,
        f: impl FnOnce(&mut Component) -> R,
    ) -> Result<R> {
        let node = self.node_mut(key)?;
        let component = node
            .components
            .get_mut(&kind)
            .ok_or(InvariantViolation::MissingComponent { node: key, kind: kind.name() })?;
        let out = f(component);
        debug_assert_eq!(component.kind(), kind, "update_component changed the component kind");
        node.rebuild_features();
        self.invalidate(key, kind.descriptors(key));
        Ok(out)
    }

    /// Set the node's transform, adding the component if needed.
    pub fn set_transform(&mut self, key: NodeKey, transform: Transform) -> Result<()> {
        if self.node(key)?.component(ComponentKind::Transform).is_some() {
            self.update_component(key, ComponentKind::Transform, |c| *c = Component::Transform(transform))
        } else {
            self.add_component(key, Component::Transform(transform))
        }
    }

    /// Component kind that provides `feature` on `key`.
    pub fn feature_owner(&self, key: NodeKey, feature: Feature) -> Result<Option<ComponentKind>> {
        Ok(self.node(key)?.features.owner(feature))
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Propagate `descriptors` from `key` to its ancestors.
    pub fn invalidate(&mut self, key: NodeKey, descriptors: DescriptorSet) -> InvalidationReport {
        let report = propagate(&mut self.nodes, key, descriptors);
        trace!(node = %key, cleared = report.cleared.len(), frames = report.frames, "invalidated");
        self.last_invalidation = report.clone();
        report
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes.get_mut(key).ok_or_else(|| InvariantViolation::StaleNode(key).into())
    }

    /// Attach without checks or invalidation; returns the edge name.
    fn link(&mut self, parent: NodeKey, child: NodeKey) -> Arc<str> {
        let id = match self.nodes.get(child) {
            Some(c) => c.id.clone(),
            None => return "".into(),
        };
        let name = match self.nodes.get_mut(parent) {
            Some(p) => {
                let name = p.free_name(&id);
                p.attach(name.clone(), child);
                name
            }
            None => return "".into(),
        };
        if let Some(c) = self.nodes.get_mut(child) {
            c.parents.push(parent);
        }
        name
    }

    /// Destroy `start` and every descendant left without parents.
    fn destroy(&mut self, start: NodeKey) {
        let mut stack = vec![start];
        let mut destroyed = 0usize;
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.remove(key) else { continue };
            destroyed += 1;
            if let Some(origin) = &node.origin {
                if self.by_object.get(&origin.key()) == Some(&key) {
                    self.by_object.remove(&origin.key());
                }
            }
            self.roots.retain(|&r| r != key);
            for (_, child) in &node.children {
                if let Some(c) = self.nodes.get_mut(*child) {
                    if let Some(i) = c.parents.iter().position(|&p| p == key) {
                        c.parents.remove(i);
                    }
                    if c.parents.is_empty() && !c.pinned {
                        stack.push(*child);
                    }
                }
            }
        }
        debug!(node = %start, destroyed, "destroyed nodes");
    }
}

impl InvalidationTarget for NodeArena {
    fn parents(&self, node: NodeKey) -> SmallVec<[NodeKey; 2]> {
        self.get(node).map(|n| n.parents.clone()).unwrap_or_default()
    }

    fn holds(&self, node: NodeKey, key: CacheKey) -> bool {
        self.get(node).is_some_and(|n| n.cache.holds(key))
    }

    fn clear(&mut self, node: NodeKey, key: CacheKey) {
        if let Some(n) = self.get_mut(node) {
            n.cache.clear(key);
        }
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_parent_leaves_graph_unchanged() {
        let mut g = SceneGraph::new();
        let a = g.create_node("a");
        let err = g.add_child(a, a).unwrap_err();
        assert!(matches!(err, crate::Error::Invariant(InvariantViolation::SelfParent(k)) if k == a));
        assert!(g.node(a).unwrap().parents().is_empty());
        assert_eq!(g.node(a).unwrap().loaded_children().count(), 0);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut g = SceneGraph::new();
        let a = g.create_node("a");
        let b = g.create_node("b");
        let c = g.create_node("c");
        g.add_child(a, b).unwrap();
        g.add_child(b, c).unwrap();
        let err = g.add_child(c, a).unwrap_err();
        assert!(matches!(err, crate::Error::Invariant(InvariantViolation::Cycle { .. })));
        assert!(g.node(a).unwrap().parents().is_empty());
    }

    #[test]
    fn test_name_collision_renames_edge() {
        let mut g = SceneGraph::new();
        let p = g.create_node("p");
        let x1 = g.create_node("x");
        let x2 = g.create_node("x");
        let x3 = g.create_node("x");
        assert_eq!(g.add_child(p, x1).unwrap(), "x");
        assert_eq!(g.add_child(p, x2).unwrap(), "x_1");
        assert_eq!(g.add_child(p, x3).unwrap(), "x_2");
        assert_eq!(g.add_child(p, x2).unwrap(), "x_1");
        // The node keeps its own id.
        assert_eq!(g.node(x2).unwrap().id(), "x");
    }

    #[test]
    fn test_multi_parent_and_release() {
        let mut g = SceneGraph::new();
        let p1 = g.create_node("p1");
        let p2 = g.create_node("p2");
        let shared = g.create_node("shared");
        let leaf = g.create_node("leaf");
        g.pin(p1).unwrap();
        g.pin(p2).unwrap();
        g.add_child(p1, shared).unwrap();
        g.add_child(p2, shared).unwrap();
        g.add_child(shared, leaf).unwrap();
        assert_eq!(g.node(shared).unwrap().parents().len(), 2);

        assert_eq!(g.remove_child(p1, "shared").unwrap(), shared);
        assert!(g.contains(shared));
        g.remove_child(p2, "shared").unwrap();
        assert!(!g.contains(shared));
        assert!(!g.contains(leaf));
        assert_eq!(g.len(), 2);

        let err = g.remove_child(p2, "shared").unwrap_err();
        assert!(matches!(err, crate::Error::Invariant(InvariantViolation::MissingChild { .. })));
    }

    #[test]
    fn test_pinned_child_survives() {
        let mut g = SceneGraph::new();
        let p = g.create_node("p");
        let c = g.create_node("c");
        g.pin(c).unwrap();
        g.add_child(p, c).unwrap();
        g.remove_child(p, "c").unwrap();
        assert!(g.contains(c));
    }

    #[test]
    fn test_feature_conflicts() {
        let mut g = SceneGraph::new();
        let p = g.create_node("p");
        let c = g.create_node("c");
        g.add_child(p, c).unwrap();

        let instance = Component::Instance(InstanceComponent { source: crate::xref::XRef::external("a.scp", None) });
        let err = g.add_component(p, instance.clone()).unwrap_err();
        assert!(matches!(err, crate::Error::Invariant(InvariantViolation::FeatureConflict { .. })));
        assert!(g.node(p).unwrap().component(ComponentKind::Instance).is_none());

        g.add_component(c, instance).unwrap();
        assert_eq!(g.feature_owner(c, Feature::Children).unwrap(), Some(ComponentKind::Instance));
    }

    #[test]
    fn test_component_lifecycle() {
        let mut g = SceneGraph::new();
        let n = g.create_node("n");
        g.add_component(n, Component::tags(["a"])).unwrap();
        let n_tags = g.update_component(n, ComponentKind::Tags, |c| match c {
            Component::Tags(t) => {
                t.push("b".into());
                t.len()
            }
            _ => 0,
        });
        assert_eq!(n_tags.unwrap(), 2);
        assert!(g.has_feature_on(n, Feature::Tags));

        let removed = g.remove_component(n, ComponentKind::Tags).unwrap();
        assert_eq!(removed, Component::tags(["a", "b"]));
        assert!(!g.has_feature_on(n, Feature::Tags));
        assert!(g.remove_component(n, ComponentKind::Tags).is_err());
    }

    #[test]
    fn test_remove_node_detaches_from_parents() {
        let mut g = SceneGraph::new();
        let p = g.create_node("p");
        let c = g.create_node("c");
        g.add_child(p, c).unwrap();
        g.remove_node(c).unwrap();
        assert!(!g.contains(c));
        assert_eq!(g.node(p).unwrap().loaded_children().count(), 0);
        assert!(g.node(c).is_err());
    }

    impl SceneGraph {
        fn has_feature_on(&self, key: NodeKey, feature: Feature) -> bool {
            self.node(key).map(|n| n.has_feature(feature)).unwrap_or(false)
        }
    }
}
