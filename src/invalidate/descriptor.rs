//! Invalidation descriptors.

use std::fmt;

use smallvec::SmallVec;

use crate::graph::NodeKey;

/// A derived value cached on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Whether the subtree carries any geometry.
    HasGeometry,
    /// Bounding box of the subtree in the node's local space.
    Bounds,
    /// Structural comparison key of the subtree.
    StructureKey,
}

impl CacheKey {
    pub const ALL: [Self; 3] = [Self::HasGeometry, Self::Bounds, Self::StructureKey];

    pub fn name(self) -> &'static str {
        match self {
            Self::HasGeometry => "has_geometry",
            Self::Bounds => "bounds",
            Self::StructureKey => "structure_key",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Signal to clear one cached value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub key: CacheKey,
    /// Node the signal starts at and must skip.
    pub origin: Option<NodeKey>,
    /// Keep going to ancestors after clearing.
    pub propagating: bool,
}

impl Descriptor {
    /// Clears `key` everywhere up the graph.
    pub const fn propagating(key: CacheKey) -> Self {
        Self { key, origin: None, propagating: true }
    }

    /// Clears `key` on the first node holding it only.
    pub const fn local(key: CacheKey) -> Self {
        Self { key, origin: None, propagating: false }
    }

    /// Same signal, skipped at `origin`.
    #[must_use]
    pub const fn skipping(mut self, origin: NodeKey) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Pending descriptors, at most one per cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    items: SmallVec<[Descriptor; 4]>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cache key, propagating.
    pub fn structural() -> Self {
        CacheKey::ALL.into_iter().map(Descriptor::propagating).collect()
    }

    /// Add `d`, merging with a descriptor for the same key.
    ///
    /// The merge keeps the broader signal: no origin beats an origin, and
    /// propagating beats local.
    pub fn insert(&mut self, d: Descriptor) {
        match self.items.iter_mut().find(|x| x.key == d.key) {
            Some(existing) => {
                if existing.origin != d.origin {
                    existing.origin = None;
                }
                existing.propagating |= d.propagating;
            }
            None => self.items.push(d),
        }
    }

    pub fn extend(&mut self, other: &DescriptorSet) {
        for d in other.iter() {
            self.insert(*d);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.items.iter()
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        self.items.iter().any(|d| d.key == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Descriptor> for DescriptorSet {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        let mut set = Self::new();
        for d in iter {
            set.insert(d);
        }
        set
    }
}

impl<'a> IntoIterator for &'a DescriptorSet {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
