//! Utility types shared by every layer.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`DecodeOptions`] / [`ResolverOptions`] / [`Config`] - Configuration
//! - Math types ([`BBox3d`], [`Color`], [`Transform`], ...) on top of glam

mod error;
mod math;
mod options;

pub use error::*;
pub use math::*;
pub use options::*;
