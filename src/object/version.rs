//! File versions and per-type legacy decode dispatch.
//!
//! The writer version in the header decides, for each value type, which of
//! the layouts used over the format's history applies. Dispatch keys on
//! `(TypeTag, Version)`: most tags only ever had the current layout.

use std::fmt;

use super::tag::TypeTag;

/// Semantic version triple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Oldest writer version this reader understands.
    pub const MIN_SUPPORTED: Self = Self::new(0, 9, 0);

    /// Newest layout known to this reader.
    pub const CURRENT: Self = Self::new(3, 2, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Check whether buffers of this version can be decoded.
    pub fn is_supported(&self) -> bool {
        *self >= Self::MIN_SUPPORTED && self.major <= Self::CURRENT.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Which historical layout to read a value with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodePath {
    Current,
    Legacy1,
    Legacy2,
    Legacy3,
}

/// Select the layout for `tag` in a buffer written by `version`.
pub fn decode_path(tag: TypeTag, version: Version) -> DecodePath {
    let v = |major, minor| Version::new(major, minor, 0);
    match tag {
        TypeTag::Color if version < v(1, 0) => DecodePath::Legacy3,
        TypeTag::Color if version < v(2, 0) => DecodePath::Legacy1,
        TypeTag::Color if version < v(3, 0) => DecodePath::Legacy2,
        TypeTag::Transform | TypeTag::Point2 | TypeTag::Point3 if version < v(2, 0) => DecodePath::Legacy1,
        TypeTag::Angle if version < v(1, 5) => DecodePath::Legacy1,
        TypeTag::Bytes if version < v(1, 2) => DecodePath::Legacy1,
        _ => DecodePath::Current,
    }
}
