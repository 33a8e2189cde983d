//! Value type tags.

/// Type tag written before every encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Null = 0x00,
    Bool = 0x01,
    UInt8 = 0x02,
    Int16 = 0x03,
    Int32 = 0x04,
    Int64 = 0x05,
    UInt32 = 0x06,
    Packed = 0x07,
    Float32 = 0x08,
    Float64 = 0x09,
    Str = 0x0A,
    Bytes = 0x0B,
    Point2 = 0x0C,
    Point3 = 0x0D,
    Angle = 0x0E,
    Color = 0x0F,
    Transform = 0x10,
    Version = 0x11,
    Array = 0x12,
    Object = 0x13,
    Ref = 0x14,
    XRef = 0x15,
}

impl TypeTag {
    /// Every tag, in wire order.
    pub const ALL: [TypeTag; 22] = [
        Self::Null,
        Self::Bool,
        Self::UInt8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt32,
        Self::Packed,
        Self::Float32,
        Self::Float64,
        Self::Str,
        Self::Bytes,
        Self::Point2,
        Self::Point3,
        Self::Angle,
        Self::Color,
        Self::Transform,
        Self::Version,
        Self::Array,
        Self::Object,
        Self::Ref,
        Self::XRef,
    ];

    /// Convert a wire byte to a tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::Packed => "packed",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Point2 => "point2",
            Self::Point3 => "point3",
            Self::Angle => "angle",
            Self::Color => "color",
            Self::Transform => "transform",
            Self::Version => "version",
            Self::Array => "array",
            Self::Object => "object",
            Self::Ref => "ref",
            Self::XRef => "xref",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values_match_order() {
        for (i, tag) in TypeTag::ALL.iter().enumerate() {
            assert_eq!(tag.as_u8() as usize, i);
            assert_eq!(TypeTag::from_u8(i as u8), Some(*tag));
        }
        assert_eq!(TypeTag::from_u8(0x16), None);
        assert_eq!(TypeTag::from_u8(0xff), None);
    }
}
