//! Derived per-node values.
//!
//! Each value is computed bottom-up with an explicit post-order walk and
//! cached on the node. Caches are cleared only by the invalidation engine;
//! a query never recomputes a cached value.

use std::collections::HashSet;

use xxhash_rust::xxh3::Xxh3;

use super::component::{Component, ComponentKind};
use super::{NodeKey, SceneGraph};
use crate::invalidate::CacheKey;
use crate::lod::DetailLevel;
use crate::util::{BBox3d, Result};

impl SceneGraph {
    /// Whether `key` or any descendant carries a mesh.
    pub fn has_geometry(&mut self, key: NodeKey) -> Result<bool> {
        for k in self.uncached_post_order(key, CacheKey::HasGeometry)? {
            let node = self.node(k)?;
            let value = node.components.contains_key(&ComponentKind::Mesh)
                || node
                    .children
                    .iter()
                    .any(|(_, c)| self.nodes.get(*c).and_then(|n| n.cache.has_geometry).unwrap_or(false));
            self.node_mut(k)?.cache.has_geometry = Some(value);
        }
        Ok(self.node(key)?.cache.has_geometry.unwrap_or(false))
    }

    /// Bounds of `key` and its subtree in the node's local space.
    ///
    /// The node's own extents come from its Bounds component, else its
    /// mesh; each child contributes its bounds under its own transform.
    /// Empty when nothing below has extents.
    pub fn bounds(&mut self, key: NodeKey) -> Result<BBox3d> {
        for k in self.uncached_post_order(key, CacheKey::Bounds)? {
            let node = self.node(k)?;
            let mut value = match (node.component(ComponentKind::Bounds), node.component(ComponentKind::Mesh)) {
                (Some(Component::Bounds(b)), _) => *b,
                (_, Some(Component::Mesh(m))) => m.extents().unwrap_or_default(),
                _ => BBox3d::EMPTY,
            };
            for (_, c) in &node.children {
                let Some(child) = self.nodes.get(*c) else { continue };
                let Some(b) = child.cache.bounds else { continue };
                let b = match child.component(ComponentKind::Transform) {
                    Some(Component::Transform(xf)) => b.transformed(&xf.to_affine()),
                    _ => b,
                };
                value.expand_by_box(&b);
            }
            self.node_mut(k)?.cache.bounds = Some(value);
        }
        Ok(self.node(key)?.cache.bounds.unwrap_or_default())
    }

    /// Hash of the subtree's structure: ids, component kinds, tags and
    /// children, in order.
    pub fn structure_key(&mut self, key: NodeKey) -> Result<u64> {
        for k in self.uncached_post_order(key, CacheKey::StructureKey)? {
            let node = self.node(k)?;
            let mut hasher = Xxh3::new();
            hasher.update(node.id.as_bytes());
            hasher.update(&[0]);
            for (kind, component) in &node.components {
                hasher.update(kind.name().as_bytes());
                if let Component::Tags(tags) = component {
                    for tag in tags {
                        hasher.update(tag.as_bytes());
                        hasher.update(&[0]);
                    }
                }
            }
            for (name, c) in &node.children {
                hasher.update(name.as_bytes());
                let child_key = self.nodes.get(*c).and_then(|n| n.cache.structure_key).unwrap_or(0);
                hasher.update(&child_key.to_le_bytes());
            }
            let value = hasher.digest();
            self.node_mut(k)?.cache.structure_key = Some(value);
        }
        Ok(self.node(key)?.cache.structure_key.unwrap_or(0))
    }

    /// Best detail level of the node's mesh for `priority`.
    pub fn select_detail(&self, key: NodeKey, priority: &[DetailLevel]) -> Result<Option<DetailLevel>> {
        Ok(match self.node(key)?.component(ComponentKind::Mesh) {
            Some(Component::Mesh(m)) => m.levels.get_best_match(priority),
            _ => None,
        })
    }

    /// Nodes under `root` without a cached `slot`, children before parents.
    ///
    /// Loads pending children on the way. Cached nodes are not descended
    /// into: their subtree value is already known.
    fn uncached_post_order(&mut self, root: NodeKey, slot: CacheKey) -> Result<Vec<NodeKey>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, false)];
        while let Some((key, expanded)) = stack.pop() {
            if expanded {
                order.push(key);
                continue;
            }
            if self.node(key)?.cache.holds(slot) || !visited.insert(key) {
                continue;
            }
            self.ensure_children(key)?;
            stack.push((key, true));
            stack.extend(self.node(key)?.children.iter().rev().map(|(_, c)| (*c, false)));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MeshComponent;
    use crate::lod::DetailMask;
    use crate::util::{DVec3, Transform};

    fn unit_box() -> BBox3d {
        BBox3d::new(DVec3::ZERO, DVec3::ONE)
    }

    #[test]
    fn test_has_geometry_bubbles_up() {
        let mut g = SceneGraph::new();
        let root = g.create_node("root");
        let mid = g.create_node("mid");
        let leaf = g.create_node("leaf");
        g.add_child(root, mid).unwrap();
        g.add_child(mid, leaf).unwrap();

        assert!(!g.has_geometry(root).unwrap());
        assert!(g.node(root).unwrap().is_cached(CacheKey::HasGeometry));

        g.add_component(leaf, Component::Mesh(MeshComponent::default())).unwrap();
        assert!(!g.node(root).unwrap().is_cached(CacheKey::HasGeometry));
        assert!(g.has_geometry(root).unwrap());
        assert!(g.has_geometry(mid).unwrap());
    }

    #[test]
    fn test_bounds_apply_child_transform() {
        let mut g = SceneGraph::new();
        let root = g.create_node("root");
        let a = g.create_node("a");
        let b = g.create_node("b");
        g.add_child(root, a).unwrap();
        g.add_child(root, b).unwrap();
        g.add_component(a, Component::Bounds(unit_box())).unwrap();
        g.add_component(b, Component::Bounds(unit_box())).unwrap();
        g.set_transform(b, Transform::from_position(DVec3::new(5.0, 0.0, 0.0))).unwrap();

        let bb = g.bounds(root).unwrap();
        assert_eq!(bb.min, DVec3::ZERO);
        assert_eq!(bb.max, DVec3::new(6.0, 1.0, 1.0));

        // Own bounds stay local: the transform only moves b inside root.
        assert_eq!(g.bounds(b).unwrap(), unit_box());
        assert!(g.node(b).unwrap().is_cached(CacheKey::Bounds));

        g.set_transform(b, Transform::from_position(DVec3::new(-3.0, 0.0, 0.0))).unwrap();
        assert!(g.node(b).unwrap().is_cached(CacheKey::Bounds));
        assert!(!g.node(root).unwrap().is_cached(CacheKey::Bounds));
        assert_eq!(g.bounds(root).unwrap().min, DVec3::new(-3.0, 0.0, 0.0));
    }

    #[test]
    fn test_bounds_empty_without_extents() {
        let mut g = SceneGraph::new();
        let root = g.create_node("root");
        assert!(g.bounds(root).unwrap().is_empty());
    }

    #[test]
    fn test_structure_key_tracks_changes() {
        let mut g = SceneGraph::new();
        let root = g.create_node("root");
        let child = g.create_node("child");
        g.add_child(root, child).unwrap();

        let k1 = g.structure_key(root).unwrap();
        assert_eq!(g.structure_key(root).unwrap(), k1);

        g.add_component(child, Component::tags(["hero"])).unwrap();
        let k2 = g.structure_key(root).unwrap();
        assert_ne!(k1, k2);

        g.remove_component(child, ComponentKind::Tags).unwrap();
        assert_eq!(g.structure_key(root).unwrap(), k1);
    }

    #[test]
    fn test_structure_key_equal_for_equal_trees() {
        let mut g = SceneGraph::new();
        let build = |g: &mut SceneGraph| {
            let r = g.create_node("r");
            let c = g.create_node("c");
            g.add_child(r, c).unwrap();
            r
        };
        let a = build(&mut g);
        let b = build(&mut g);
        assert_eq!(g.structure_key(a).unwrap(), g.structure_key(b).unwrap());
    }

    #[test]
    fn test_select_detail() {
        use DetailLevel::*;
        let mut g = SceneGraph::new();
        let n = g.create_node("n");
        assert_eq!(g.select_detail(n, &[High]).unwrap(), None);

        let levels = DetailMask::from_levels(&[Low, High]);
        g.add_component(n, Component::Mesh(MeshComponent { levels, ..Default::default() })).unwrap();
        assert_eq!(g.select_detail(n, &[Highest, High, Medium, Low]).unwrap(), Some(High));
        assert_eq!(g.select_detail(n, &[Base]).unwrap(), None);
    }

    #[test]
    fn test_deep_chain_is_iterative() {
        let mut g = SceneGraph::new();
        let root = g.create_node("n0");
        let mut prev = root;
        for i in 1..50_000 {
            let n = g.create_node(format!("n{i}"));
            g.add_child(prev, n).unwrap();
            prev = n;
        }
        g.add_component(prev, Component::Mesh(MeshComponent::default())).unwrap();
        assert!(g.has_geometry(root).unwrap());
    }
}
