//! # scenepack
//!
//! Reader for the scenepack binary scene container: a random-access buffer
//! of typed objects with same-buffer references, cross-file references and
//! embedded resources, decoded lazily into a multi-parent component graph.
//!
//! ## Modules
//!
//! - [`util`] - Errors, options and math types
//! - [`container`] - Low-level buffer format: header, varints, sections
//! - [`object`] - Object model, reference resolution and legacy decode paths
//! - [`xref`] - Cross-file references and the async resource manager
//! - [`graph`] - Component node graph with lazy children
//! - [`invalidate`] - Cache invalidation over the parent graph
//! - [`lod`] - Detail-level masks
//! - [`fixture`] - Buffer assembler for tests and demos
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use scenepack::prelude::*;
//!
//! let doc = Arc::new(Document::open("scene.scp", DecodeOptions::default())?);
//! let mut graph = SceneGraph::new();
//! let root = graph.load_document(doc)?;
//!
//! for (name, child) in graph.children(root)? {
//!     println!("{name}: geometry={}", graph.has_geometry(child)?);
//! }
//! ```

pub mod container;
pub mod fixture;
pub mod graph;
pub mod invalidate;
pub mod lod;
pub mod object;
pub mod util;
pub mod xref;

// Re-export commonly used types
pub use util::{Error, FormatError, InvariantViolation, ResourceError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::graph::{Component, ComponentKind, Node, NodeKey, SceneGraph};
    pub use crate::lod::{DetailLevel, DetailMask};
    pub use crate::object::{Document, DocumentObject, Entity, ObjectHandle, Version};
    pub use crate::util::{Config, DecodeOptions, Error, ResolverOptions, Result};
    pub use crate::xref::{LoaderRegistry, Payload, ResourceManager, XRef};
}
