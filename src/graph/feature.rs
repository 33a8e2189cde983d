//! Features: named capabilities a node exposes through its components.

use std::collections::HashMap;
use std::fmt;

use super::component::{Component, ComponentKind};

/// A capability backed by exactly one attached component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Geometry,
    Lod,
    Material,
    Transform,
    Tags,
    Properties,
    Bounds,
    /// Supplies the node's children.
    Children,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::Lod => "lod",
            Self::Material => "material",
            Self::Transform => "transform",
            Self::Tags => "tags",
            Self::Properties => "properties",
            Self::Bounds => "bounds",
            Self::Children => "children",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Feature → owning component kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureIndex {
    owners: HashMap<Feature, ComponentKind>,
}

impl FeatureIndex {
    /// Build the index over `components` from scratch.
    pub fn build<'a>(components: impl IntoIterator<Item = &'a Component>) -> Self {
        let mut owners = HashMap::new();
        for c in components {
            let kind = c.kind();
            for &f in kind.features() {
                owners.entry(f).or_insert(kind);
            }
        }
        Self { owners }
    }

    /// Component kind that owns `feature`.
    pub fn owner(&self, feature: Feature) -> Option<ComponentKind> {
        self.owners.get(&feature).copied()
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.owners.contains_key(&feature)
    }

    /// First feature of `kind` already owned by another component.
    pub fn conflict(&self, kind: ComponentKind) -> Option<(Feature, ComponentKind)> {
        kind.features()
            .iter()
            .find_map(|&f| self.owners.get(&f).map(|&owner| (f, owner)))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Features, sorted.
    pub fn features(&self) -> Vec<Feature> {
        let mut v: Vec<Feature> = self.owners.keys().copied().collect();
        v.sort_unstable();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::component::MeshComponent;
    use crate::util::Transform;

    #[test]
    fn test_build_and_conflict() {
        let comps = [Component::Mesh(MeshComponent::default()), Component::Transform(Transform::IDENTITY)];
        let idx = FeatureIndex::build(comps.iter());
        assert_eq!(idx.features(), vec![Feature::Geometry, Feature::Lod, Feature::Transform]);
        assert_eq!(idx.owner(Feature::Lod), Some(ComponentKind::Mesh));
        assert!(!idx.has(Feature::Children));

        assert_eq!(idx.conflict(ComponentKind::Mesh), Some((Feature::Geometry, ComponentKind::Mesh)));
        assert_eq!(idx.conflict(ComponentKind::Instance), None);
        assert_eq!(FeatureIndex::build([].iter()).len(), 0);
    }
}
