//! Cross-file references and their resolution.
//!
//! - [`XRef`] / [`XRefStyle`] - references as decoded from a buffer
//! - [`XRefRecord`] - sub-resources embedded in the buffer itself
//! - [`LoaderRegistry`] - extension → [`PayloadLoader`]
//! - [`ByteSource`] - where external bytes come from
//! - [`ResourceManager`] - exactly-once async resolution

mod loader;
mod manager;
mod naming;
mod record;
mod reference;
mod source;

pub use loader::{
    DocumentLoader, ImageData, ImageLoader, LoaderRegistry, MeshCodec, MeshData, MeshLoader, Payload, PayloadLoader,
    RawLoader, RawMeshCodec,
};
pub use manager::{Resolved, ResourceKey, ResourceManager};
pub use naming::{anonymous_name, content_hash, ANONYMOUS_PREFIX};
pub use record::XRefRecord;
pub use reference::{extension, file_name, XRef, XRefStyle};
pub use source::{ByteSource, FileSource, MemorySource};
