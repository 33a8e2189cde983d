//! Decoded values ("entities") and document objects.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::arena::ObjectHandle;
use super::tag::TypeTag;
use super::version::Version;
use crate::util::{Angle, Color, DVec2, DVec3, Transform};
use crate::xref::XRef;

/// Unresolved same-buffer reference: the byte offset of the target object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RefToken {
    /// Offset of the referenced object.
    pub target: i32,
    /// Offset the reference was read at.
    pub at: usize,
}

/// A decoded value.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Null,
    Bool(bool),
    UInt8(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Packed(u32),
    Float32(f32),
    Float64(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    Point2(DVec2),
    Point3(DVec3),
    Angle(Angle),
    Color(Color),
    Transform(Transform),
    Version(Version),
    Array(Vec<Entity>),
    /// Inline object, already decoded into the arena.
    Object(ObjectHandle),
    /// Same-buffer reference, resolved on access.
    Ref(RefToken),
    /// Cross-file reference.
    XRef(XRef),
}

impl Entity {
    /// Tag this entity is encoded with.
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Null => TypeTag::Null,
            Self::Bool(_) => TypeTag::Bool,
            Self::UInt8(_) => TypeTag::UInt8,
            Self::Int16(_) => TypeTag::Int16,
            Self::Int32(_) => TypeTag::Int32,
            Self::Int64(_) => TypeTag::Int64,
            Self::UInt32(_) => TypeTag::UInt32,
            Self::Packed(_) => TypeTag::Packed,
            Self::Float32(_) => TypeTag::Float32,
            Self::Float64(_) => TypeTag::Float64,
            Self::Str(_) => TypeTag::Str,
            Self::Bytes(_) => TypeTag::Bytes,
            Self::Point2(_) => TypeTag::Point2,
            Self::Point3(_) => TypeTag::Point3,
            Self::Angle(_) => TypeTag::Angle,
            Self::Color(_) => TypeTag::Color,
            Self::Transform(_) => TypeTag::Transform,
            Self::Version(_) => TypeTag::Version,
            Self::Array(_) => TypeTag::Array,
            Self::Object(_) => TypeTag::Object,
            Self::Ref(_) => TypeTag::Ref,
            Self::XRef(_) => TypeTag::XRef,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Any integer-valued entity widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::UInt8(v) => Some(v as i64),
            Self::Int16(v) => Some(v as i64),
            Self::Int32(v) => Some(v as i64),
            Self::Int64(v) => Some(v),
            Self::UInt32(v) | Self::Packed(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Any numeric entity as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(v) => Some(v as f64),
            Self::Float64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_point3(&self) -> Option<DVec3> {
        match *self {
            Self::Point3(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match *self {
            Self::Color(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<&Transform> {
        match self {
            Self::Transform(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Entity]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_xref(&self) -> Option<&XRef> {
        match self {
            Self::XRef(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_ref_token(&self) -> Option<RefToken> {
        match *self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Point2(p) => write!(f, "({}, {})", p.x, p.y),
            Self::Point3(p) => write!(f, "({}, {}, {})", p.x, p.y, p.z),
            Self::Angle(a) => write!(f, "{}deg", a.degrees()),
            Self::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            Self::Transform(t) => write!(
                f,
                "transform(({}, {}, {}){})",
                t.position.x,
                t.position.y,
                t.position.z,
                if t.mapping.is_some() { ", mapped" } else { "" }
            ),
            Self::Version(v) => write!(f, "v{v}"),
            Self::Array(a) => write!(f, "[{} entries]", a.len()),
            Self::Object(h) => write!(f, "object#{}", h.index()),
            Self::Ref(r) => write!(f, "ref@{}", r.target),
            Self::XRef(x) => write!(f, "xref({})", x.target()),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            other => match other.as_i64() {
                Some(v) => write!(f, "{v}"),
                None => write!(f, "{}", other.tag().name()),
            },
        }
    }
}

/// A decoded object: type name, optional id and a key/value field map.
#[derive(Clone, Debug)]
pub struct DocumentObject {
    pub(crate) offset: i32,
    pub(crate) end: usize,
    pub(crate) type_name: Arc<str>,
    pub(crate) id: Option<Arc<str>>,
    pub(crate) fields: HashMap<Arc<str>, Entity>,
}

impl DocumentObject {
    /// Byte offset of the object's `OBJ{` marker.
    #[inline]
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Offset just past the object's `}OBJ` marker.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Entity> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Entity)> {
        let mut entries: Vec<_> = self.fields.iter().map(|(k, v)| (k.as_ref(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Entity::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Entity::as_i64)
    }

    pub fn get_array(&self, key: &str) -> Option<&[Entity]> {
        self.get(key).and_then(Entity::as_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Entity::UInt8(200).as_i64(), Some(200));
        assert_eq!(Entity::Int16(-3).as_f64(), Some(-3.0));
        assert_eq!(Entity::Packed(7).as_i64(), Some(7));
        assert_eq!(Entity::Str("x".into()).as_i64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Entity::Int32(-5).to_string(), "-5");
        assert_eq!(Entity::Str("a".into()).to_string(), "\"a\"");
        assert_eq!(Entity::Ref(RefToken { target: 64, at: 80 }).to_string(), "ref@64");
        assert_eq!(Entity::Bytes(Arc::from(&[1u8, 2][..])).to_string(), "<2 bytes>");
    }

    #[test]
    fn test_tags() {
        assert_eq!(Entity::Null.tag(), TypeTag::Null);
        assert_eq!(Entity::Array(vec![]).tag(), TypeTag::Array);
    }
}
