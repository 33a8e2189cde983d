//! Math type re-exports and the composite value types of the container.
//!
//! This module re-exports the `glam` types used across the crate and defines
//! the value types that need more than a plain vector: bounding boxes,
//! angles, colors and node transforms.

pub use glam::{DAffine3, DMat3, DVec2, DVec3, Vec4};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// 3D bounding box with double precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// The eight corners, min corner first.
    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(a.x, b.y, b.z),
            DVec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned box enclosing this box after an affine transform.
    pub fn transformed(&self, xf: &DAffine3) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::EMPTY;
        for corner in self.corners() {
            out.expand_by_point(xf.transform_point3(corner));
        }
        out
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

/// Angle stored in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Angle(pub f64);

impl Angle {
    #[inline]
    pub fn from_radians(r: f64) -> Self {
        Self(r)
    }

    #[inline]
    pub fn from_degrees(d: f64) -> Self {
        Self(d.to_radians())
    }

    #[inline]
    pub fn radians(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }
}

/// Linear RGBA color, components in 0..=1.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Color from 8-bit channels.
    #[inline]
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Color from a packed `0xAARRGGBB` word.
    #[inline]
    pub fn from_argb32(argb: u32) -> Self {
        let [b, g, r, a] = argb.to_le_bytes();
        Self::from_rgba8(r, g, b, a)
    }

    #[inline]
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Node transform: a position plus an optional 3x3 linear mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: DVec3,
    pub mapping: Option<DMat3>,
}

impl Transform {
    pub const IDENTITY: Self = Self { position: DVec3::ZERO, mapping: None };

    /// Pure translation.
    pub fn from_position(position: DVec3) -> Self {
        Self { position, mapping: None }
    }

    /// Translation plus linear mapping.
    pub fn new(position: DVec3, mapping: DMat3) -> Self {
        Self { position, mapping: Some(mapping) }
    }

    /// Affine matrix; the mapping is applied before the translation.
    pub fn to_affine(&self) -> DAffine3 {
        DAffine3::from_mat3_translation(self.mapping.unwrap_or(DMat3::IDENTITY), self.position)
    }

    pub fn is_identity(&self) -> bool {
        self.position == DVec3::ZERO && self.mapping.map_or(true, |m| m == DMat3::IDENTITY)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
