//! Graph nodes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use smallvec::SmallVec;

use super::arena::NodeKey;
use super::component::{Component, ComponentKind};
use super::feature::{Feature, FeatureIndex};
use crate::invalidate::CacheKey;
use crate::object::{Document, DocumentId, ObjectHandle};
use crate::util::BBox3d;

/// Where a node was decoded from.
#[derive(Clone)]
pub struct Origin {
    pub doc: Arc<Document>,
    pub handle: ObjectHandle,
}

impl Origin {
    pub(crate) fn key(&self) -> (DocumentId, ObjectHandle) {
        (self.doc.id(), self.handle)
    }
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.doc.name(), self.handle.index())
    }
}

/// Lazy-load state of a node still tied to its backing object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Backing {
    /// Entries in the backing `children` array.
    pub expected: usize,
    /// Entries materialized so far.
    pub loaded: usize,
}

impl Backing {
    pub(crate) fn is_complete(&self) -> bool {
        self.loaded >= self.expected
    }
}

/// Cached derived values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct DerivedCache {
    pub has_geometry: Option<bool>,
    pub bounds: Option<BBox3d>,
    pub structure_key: Option<u64>,
}

impl DerivedCache {
    pub(crate) fn holds(&self, key: CacheKey) -> bool {
        match key {
            CacheKey::HasGeometry => self.has_geometry.is_some(),
            CacheKey::Bounds => self.bounds.is_some(),
            CacheKey::StructureKey => self.structure_key.is_some(),
        }
    }

    pub(crate) fn clear(&mut self, key: CacheKey) {
        match key {
            CacheKey::HasGeometry => self.has_geometry = None,
            CacheKey::Bounds => self.bounds = None,
            CacheKey::StructureKey => self.structure_key = None,
        }
    }
}

/// A node of the scene graph.
///
/// Child names are per edge: the same node can sit under two parents with
/// a different name in each.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: Arc<str>,
    pub(crate) parents: SmallVec<[NodeKey; 2]>,
    pub(crate) children: Vec<(Arc<str>, NodeKey)>,
    pub(crate) child_names: HashMap<Arc<str>, NodeKey>,
    pub(crate) components: BTreeMap<ComponentKind, Component>,
    pub(crate) features: FeatureIndex,
    pub(crate) origin: Option<Origin>,
    pub(crate) backing: Option<Backing>,
    pub(crate) pinned: bool,
    pub(crate) cache: DerivedCache,
}

impl Node {
    pub(crate) fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            parents: SmallVec::new(),
            children: Vec::new(),
            child_names: HashMap::new(),
            components: BTreeMap::new(),
            features: FeatureIndex::default(),
            origin: None,
            backing: None,
            pinned: false,
            cache: DerivedCache::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn parents(&self) -> &[NodeKey] {
        &self.parents
    }

    /// Children materialized so far, with their names under this node.
    pub fn loaded_children(&self) -> impl Iterator<Item = (&str, NodeKey)> {
        self.children.iter().map(|(name, key)| (name.as_ref(), *key))
    }

    /// Children known to exist, loaded or not.
    pub fn expected_children(&self) -> usize {
        match self.backing {
            Some(b) => self.children.len() + b.expected.saturating_sub(b.loaded),
            None => self.children.len(),
        }
    }

    /// Whether a lazy load is still pending.
    pub fn has_pending_children(&self) -> bool {
        self.backing.is_some_and(|b| !b.is_complete())
    }

    /// Whether the node is still tied to its backing document object.
    pub fn is_backed(&self) -> bool {
        self.backing.is_some()
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.get(&kind)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn component_kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.components.keys().copied()
    }

    pub fn features(&self) -> &FeatureIndex {
        &self.features
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.has(feature)
    }

    /// Whether the derived value for `key` is currently cached.
    pub fn is_cached(&self, key: CacheKey) -> bool {
        self.cache.holds(key)
    }

    pub(crate) fn child_by_name(&self, name: &str) -> Option<NodeKey> {
        self.child_names.get(name).copied()
    }

    pub(crate) fn name_of(&self, child: NodeKey) -> Option<&Arc<str>> {
        self.children.iter().find(|(_, k)| *k == child).map(|(n, _)| n)
    }

    /// Smallest free name for `id` among this node's children.
    pub(crate) fn free_name(&self, id: &Arc<str>) -> Arc<str> {
        if !self.child_names.contains_key(id) {
            return id.clone();
        }
        (1..)
            .map(|n| Arc::<str>::from(format!("{id}_{n}")))
            .find(|candidate| !self.child_names.contains_key(candidate))
            .unwrap_or_else(|| id.clone())
    }

    pub(crate) fn attach(&mut self, name: Arc<str>, child: NodeKey) {
        self.child_names.insert(name.clone(), child);
        self.children.push((name, child));
    }

    pub(crate) fn detach(&mut self, name: &str) -> Option<NodeKey> {
        let child = self.child_names.remove(name)?;
        self.children.retain(|(n, _)| n.as_ref() != name);
        Some(child)
    }

    pub(crate) fn rebuild_features(&mut self) {
        self.features = FeatureIndex::build(self.components.values());
    }
}
