//! Building graph nodes from documents.
//!
//! A document object of schema type `Node` becomes a graph node. Its
//! components are decoded eagerly, its children on first access. Every
//! `(document, object)` pair maps to exactly one node, so an object reached
//! through several parents becomes a multi-parent node.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::component::{Component, ComponentKind};
use super::node::{Backing, Node, Origin};
use super::{NodeKey, SceneGraph};
use crate::invalidate::DescriptorSet;
use crate::object::{Document, Entity, ObjectHandle};
use crate::util::{FormatError, InvariantViolation, Result};
use crate::xref::{MeshData, ResourceManager};

/// Everything needed to create a node, decoded without touching the graph.
struct NodeSeed {
    id: String,
    components: BTreeMap<ComponentKind, Component>,
    expected: usize,
}

fn seed_node(doc: &Document, handle: ObjectHandle) -> Result<NodeSeed> {
    let obj = doc.object(handle)?;
    let id = obj.id().unwrap_or_else(|| obj.type_name()).to_string();

    let mut components: BTreeMap<ComponentKind, Component> = BTreeMap::new();
    for h in doc.resolve_array(handle, "components")? {
        let comp_obj = doc.object(h)?;
        let component = Component::from_object(doc, &comp_obj);
        let kind = component.kind();
        match (components.get_mut(&kind), component) {
            (None, component) => {
                components.insert(kind, component);
            }
            (Some(Component::Properties(have)), Component::Properties(more)) => {
                for (group, values) in more.groups {
                    for (key, value) in values {
                        have.insert(group.clone(), key, value);
                    }
                }
            }
            (Some(_), _) => {
                warn!(doc = doc.name(), node = %id, component = %kind, "duplicate component, keeping the first");
            }
        }
    }

    let expected = obj
        .get_array("children")
        .map(|items| items.iter().filter(|e| matches!(e, Entity::Object(_) | Entity::Ref(_))).count())
        .unwrap_or(0);

    Ok(NodeSeed { id, components, expected })
}

/// A document child of a node, decoded but not yet linked.
enum Pending {
    Existing(NodeKey),
    New(ObjectHandle, NodeSeed),
}

impl SceneGraph {
    /// Load `doc` and return its pinned root node.
    ///
    /// Only the root is decoded here; descendants load on access. Loading
    /// the same document twice returns the same root.
    pub fn load_document(&mut self, doc: Arc<Document>) -> Result<NodeKey> {
        let root = self.node_for_object(&doc, doc.root())?;
        self.pin(root)?;
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
        debug!(doc = doc.name(), root = %root, objects = doc.cached_objects(), "loaded document");
        Ok(root)
    }

    /// Node for `handle` in `doc`, created on first request.
    pub fn node_for_object(&mut self, doc: &Arc<Document>, handle: ObjectHandle) -> Result<NodeKey> {
        if let Some(&key) = self.by_object.get(&(doc.id(), handle)) {
            return Ok(key);
        }
        let seed = seed_node(doc, handle)?;
        Ok(self.plant(doc, handle, seed))
    }

    /// Materialize pending children of `key`; returns how many edges were added.
    ///
    /// Children are decoded and checked before the graph changes, so an
    /// error leaves the graph as it was.
    pub fn ensure_children(&mut self, key: NodeKey) -> Result<usize> {
        let node = self.node(key)?;
        let origin = match (&node.origin, node.backing) {
            (Some(origin), Some(backing)) if !backing.is_complete() => origin.clone(),
            _ => return Ok(0),
        };
        let plan = self.plan_children(key, &origin)?;
        let added = self.apply_children(key, &origin.doc, plan)?;
        debug!(node = %key, added, "materialized children");
        Ok(added)
    }

    /// Drop and re-materialize the document children of `key`.
    ///
    /// Children come back through the same `(document, object)` node
    /// cache, so reloading never duplicates a node. Nodes whose backing
    /// link is broken are left alone. The new child list is decoded and
    /// checked first; an error leaves the graph as it was.
    pub fn reload_children(&mut self, key: NodeKey) -> Result<usize> {
        let node = self.node(key)?;
        let Some(origin) = node.origin.clone().filter(|_| node.backing.is_some()) else {
            return Ok(0);
        };
        let plan = self.plan_children(key, &origin)?;
        let backed: Vec<NodeKey> = plan
            .iter()
            .filter_map(|p| match p {
                Pending::Existing(child) => Some(*child),
                Pending::New(..) => None,
            })
            .collect();

        let mut detached = Vec::new();
        for child in backed {
            let Some(name) = self.node(key)?.name_of(child).cloned() else { continue };
            self.node_mut(key)?.detach(&name);
            if let Some(c) = self.nodes.get_mut(child) {
                if let Some(i) = c.parents.iter().position(|&p| p == key) {
                    c.parents.remove(i);
                }
            }
            detached.push(child);
        }

        let added = self.apply_children(key, &origin.doc, plan)?;
        for child in detached {
            let orphaned = self.nodes.get(child).is_some_and(|c| c.parents.is_empty() && !c.pinned);
            if orphaned {
                self.destroy(child);
            }
        }
        self.invalidate(key, DescriptorSet::structural());
        debug!(node = %key, added, "reloaded children");
        Ok(added)
    }

    /// Decode and check the document children of `key` without linking them.
    fn plan_children(&self, key: NodeKey, origin: &Origin) -> Result<Vec<Pending>> {
        let doc = &origin.doc;
        let mut plan = Vec::new();
        let mut seen = HashSet::new();
        for handle in doc.resolve_array(origin.handle, "children")? {
            if !seen.insert(handle) {
                continue;
            }
            if handle == origin.handle {
                return Err(InvariantViolation::SelfParent(key).into());
            }
            match self.by_object.get(&(doc.id(), handle)) {
                Some(&child) => {
                    if self.is_ancestor(child, key) {
                        return Err(InvariantViolation::Cycle { parent: key, child }.into());
                    }
                    plan.push(Pending::Existing(child));
                }
                None => plan.push(Pending::New(handle, seed_node(doc, handle)?)),
            }
        }
        Ok(plan)
    }

    /// Link a checked plan under `key` and mark its backing complete.
    fn apply_children(&mut self, key: NodeKey, doc: &Arc<Document>, plan: Vec<Pending>) -> Result<usize> {
        let mut added = 0;
        for p in plan {
            let child = match p {
                Pending::Existing(child) => child,
                Pending::New(handle, seed) => self.plant(doc, handle, seed),
            };
            if self.node(key)?.name_of(child).is_none() {
                self.link(key, child);
                added += 1;
            }
        }
        if let Some(b) = self.node_mut(key)?.backing.as_mut() {
            b.loaded = b.expected;
        }
        Ok(added)
    }

    /// Children of `key` with their names, loading pending ones first.
    pub fn children(&mut self, key: NodeKey) -> Result<Vec<(String, NodeKey)>> {
        self.ensure_children(key)?;
        Ok(self.node(key)?.loaded_children().map(|(name, k)| (name.to_string(), k)).collect())
    }

    /// Child of `key` named `name`, loading pending children first.
    pub fn child(&mut self, key: NodeKey, name: &str) -> Result<Option<NodeKey>> {
        self.ensure_children(key)?;
        Ok(self.node(key)?.child_by_name(name))
    }

    /// Resolve the node's [`Instance`](Component::Instance) source and
    /// attach the referenced document node as a child.
    ///
    /// Resolving the same instance again returns the same child.
    pub async fn load_instance(&mut self, key: NodeKey, resources: &ResourceManager) -> Result<NodeKey> {
        let node = self.node(key)?;
        let Some(Component::Instance(instance)) = node.component(ComponentKind::Instance) else {
            return Err(InvariantViolation::MissingComponent { node: key, kind: ComponentKind::Instance.name() }.into());
        };
        let source = instance.source.clone();
        let doc = node.origin.as_ref().map(|o| o.doc.clone());

        let resolved = resources.resolve_target(doc.as_deref(), &source).await?;
        let Some(nested) = resolved.payload.as_document() else {
            return Err(FormatError::MalformedPayload {
                target: source.target().to_string(),
                reason: format!("instance source is {}, not a document", resolved.payload.kind()),
            }
            .into());
        };
        let handle = resolved.object.unwrap_or_else(|| nested.root());
        let child = self.node_for_object(nested, handle)?;
        self.add_child(key, child)?;
        debug!(node = %key, child = %child, source = source.target(), "instance loaded");
        Ok(child)
    }

    /// Resolve and attach the mesh data of the node's Mesh component.
    ///
    /// Returns `None` when the component has no source.
    pub async fn load_mesh(&mut self, key: NodeKey, resources: &ResourceManager) -> Result<Option<Arc<MeshData>>> {
        let node = self.node(key)?;
        let Some(Component::Mesh(mesh)) = node.component(ComponentKind::Mesh) else {
            return Err(InvariantViolation::MissingComponent { node: key, kind: ComponentKind::Mesh.name() }.into());
        };
        if let Some(data) = &mesh.data {
            return Ok(Some(data.clone()));
        }
        let Some(source) = mesh.source.clone() else {
            return Ok(None);
        };
        let doc = node.origin.as_ref().map(|o| o.doc.clone());

        let payload = match doc.as_deref() {
            Some(doc) => resources.resolve(doc, &source).await?,
            None => resources.resolve_external(&source).await?,
        };
        let Some(data) = payload.as_mesh().cloned() else {
            return Err(FormatError::MalformedPayload {
                target: source.target().to_string(),
                reason: format!("mesh source is {}, not a mesh", payload.kind()),
            }
            .into());
        };
        self.update_component(key, ComponentKind::Mesh, |c| {
            if let Component::Mesh(m) = c {
                m.data = Some(data.clone());
            }
        })?;
        Ok(Some(data))
    }

    /// Insert a seeded node and register it in the object cache.
    fn plant(&mut self, doc: &Arc<Document>, handle: ObjectHandle, seed: NodeSeed) -> NodeKey {
        let mut node = Node::new(seed.id);
        node.components = seed.components;
        node.rebuild_features();
        node.origin = Some(Origin { doc: doc.clone(), handle });
        node.backing = Some(Backing { expected: seed.expected, loaded: 0 });
        let key = self.nodes.insert(node);
        self.by_object.insert((doc.id(), handle), key);
        key
    }
}
