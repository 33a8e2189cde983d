//! Node components.
//!
//! The component set is closed: [`Component`] is a tagged union over the
//! kinds the document schema knows, and [`ComponentKind`] carries the
//! per-kind metadata (features, link breaking, invalidation descriptors).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::arena::NodeKey;
use super::feature::Feature;
use crate::invalidate::{CacheKey, Descriptor, DescriptorSet};
use crate::lod::DetailMask;
use crate::object::{Document, DocumentObject, Entity};
use crate::util::{BBox3d, Color, Transform};
use crate::xref::{MeshData, XRef};

/// Kind tag of a component; a node holds at most one component per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Mesh,
    Material,
    Transform,
    Tags,
    Properties,
    Bounds,
    Instance,
}

impl ComponentKind {
    pub const ALL: [Self; 7] = [
        Self::Mesh,
        Self::Material,
        Self::Transform,
        Self::Tags,
        Self::Properties,
        Self::Bounds,
        Self::Instance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mesh => "Mesh",
            Self::Material => "Material",
            Self::Transform => "Transform",
            Self::Tags => "Tags",
            Self::Properties => "Properties",
            Self::Bounds => "Bounds",
            Self::Instance => "Instance",
        }
    }

    /// Kind for a schema type name; unknown names have none.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Features a component of this kind provides.
    pub fn features(self) -> &'static [Feature] {
        match self {
            Self::Mesh => &[Feature::Geometry, Feature::Lod],
            Self::Material => &[Feature::Material],
            Self::Transform => &[Feature::Transform],
            Self::Tags => &[Feature::Tags],
            Self::Properties => &[Feature::Properties],
            Self::Bounds => &[Feature::Bounds],
            Self::Instance => &[Feature::Children],
        }
    }

    /// Whether adding this component severs the node from its document.
    pub fn breaks_backing_link(self) -> bool {
        matches!(self, Self::Mesh | Self::Instance)
    }

    /// Descriptors sent when a component of this kind on `node` changes.
    pub fn descriptors(self, node: NodeKey) -> DescriptorSet {
        use CacheKey::*;
        match self {
            Self::Mesh | Self::Instance => DescriptorSet::structural(),
            // Own bounds are in local space; only ancestors see the transform.
            Self::Transform => std::iter::once(Descriptor::propagating(Bounds).skipping(node)).collect(),
            Self::Bounds => std::iter::once(Descriptor::propagating(Bounds)).collect(),
            Self::Tags | Self::Properties | Self::Material => {
                std::iter::once(Descriptor::propagating(StructureKey)).collect()
            }
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mesh reference with its available detail levels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshComponent {
    pub source: Option<XRef>,
    pub levels: DetailMask,
    /// Extents stored in the document, if any.
    pub bounds: Option<BBox3d>,
    /// Decoded mesh, once loaded.
    pub data: Option<Arc<MeshData>>,
}

impl MeshComponent {
    /// Stored extents, or the extents of the loaded mesh.
    pub fn extents(&self) -> Option<BBox3d> {
        self.bounds.or_else(|| self.data.as_ref().map(|d| d.bounds()))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialComponent {
    pub name: Option<String>,
    pub color: Color,
    pub texture: Option<XRef>,
}

/// Reference to a document whose root becomes the node's child.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceComponent {
    pub source: XRef,
}

/// Values of component types the schema does not know, grouped by type name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertiesComponent {
    pub groups: BTreeMap<String, BTreeMap<String, Entity>>,
}

impl PropertiesComponent {
    pub fn get(&self, group: &str, key: &str) -> Option<&Entity> {
        self.groups.get(group)?.get(key)
    }

    pub fn insert(&mut self, group: impl Into<String>, key: impl Into<String>, value: Entity) {
        self.groups.entry(group.into()).or_default().insert(key.into(), value);
    }
}

/// A component attached to a node.
#[derive(Clone, Debug, PartialEq)]
pub enum Component {
    Mesh(MeshComponent),
    Material(MaterialComponent),
    Transform(Transform),
    Tags(Vec<String>),
    Properties(PropertiesComponent),
    Bounds(BBox3d),
    Instance(InstanceComponent),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Mesh(_) => ComponentKind::Mesh,
            Self::Material(_) => ComponentKind::Material,
            Self::Transform(_) => ComponentKind::Transform,
            Self::Tags(_) => ComponentKind::Tags,
            Self::Properties(_) => ComponentKind::Properties,
            Self::Bounds(_) => ComponentKind::Bounds,
            Self::Instance(_) => ComponentKind::Instance,
        }
    }

    /// Tag list with duplicates removed, first occurrence kept.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for t in tags {
            let t = t.into();
            if !out.contains(&t) {
                out.push(t);
            }
        }
        Self::Tags(out)
    }

    /// Decode a component from its document object.
    ///
    /// Type names outside the schema become a [`PropertiesComponent`] holding
    /// the object's fields under its type name.
    pub fn from_object(doc: &Document, obj: &DocumentObject) -> Self {
        let point = |key: &str| obj.get(key).and_then(Entity::as_point3);
        let xref = |key: &str| obj.get(key).and_then(Entity::as_xref).cloned();
        let bbox = || match (point("min"), point("max")) {
            (Some(min), Some(max)) => Some(BBox3d::new(min, max)),
            _ => None,
        };

        match ComponentKind::from_type_name(obj.type_name()) {
            Some(ComponentKind::Mesh) => Self::Mesh(MeshComponent {
                source: xref("source"),
                levels: obj.get_i64("levels").map(|b| DetailMask::from_bits(b as u32)).unwrap_or_default(),
                bounds: bbox(),
                data: None,
            }),
            Some(ComponentKind::Material) => Self::Material(MaterialComponent {
                name: obj.get_str("name").map(str::to_string),
                color: obj.get("color").and_then(Entity::as_color).unwrap_or_default(),
                texture: xref("texture"),
            }),
            Some(ComponentKind::Transform) => {
                Self::Transform(obj.get("transform").and_then(Entity::as_transform).copied().unwrap_or_default())
            }
            Some(ComponentKind::Tags) => Self::tags(
                obj.get_array("tags")
                    .unwrap_or_default()
                    .iter()
                    .filter_map(Entity::as_str),
            ),
            Some(ComponentKind::Bounds) => Self::Bounds(bbox().unwrap_or_default()),
            Some(ComponentKind::Instance) => match xref("source") {
                Some(source) => Self::Instance(InstanceComponent { source }),
                None => {
                    warn!(doc = doc.name(), offset = obj.offset(), "instance without source, kept as properties");
                    Self::Properties(properties_of(obj))
                }
            },
            Some(ComponentKind::Properties) | None => {
                if obj.type_name() != ComponentKind::Properties.name() {
                    warn!(
                        doc = doc.name(),
                        offset = obj.offset(),
                        type_name = obj.type_name(),
                        "unknown component type, kept as properties"
                    );
                }
                Self::Properties(properties_of(obj))
            }
        }
    }
}

fn properties_of(obj: &DocumentObject) -> PropertiesComponent {
    let mut props = PropertiesComponent::default();
    for (key, value) in obj.fields() {
        props.insert(obj.type_name(), key, value.clone());
    }
    props
}
