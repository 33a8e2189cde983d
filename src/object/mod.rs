//! Object model and same-buffer reference resolution.
//!
//! A [`Document`] owns one container buffer. Values decode into
//! [`Entity`]s; objects live in an offset-indexed arena and are addressed by
//! [`ObjectHandle`]. References stay as [`RefToken`]s until resolved, and a
//! resolved offset is never decoded twice.
//!
//! Legacy files are handled per value: [`decode_path`] picks the layout
//! from the type tag and the file version.

mod arena;
mod decode;
mod document;
mod entity;
mod tag;
mod version;

pub use arena::ObjectHandle;
pub use document::{Document, DocumentId};
pub use entity::{DocumentObject, Entity, RefToken};
pub use tag::TypeTag;
pub use version::{decode_path, DecodePath, Version};
