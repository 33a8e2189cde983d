//! Invalidation of derived node caches.
//!
//! Derived values (has-geometry, bounds, structure key) are computed on
//! demand and cached per node. They stay consistent only because every
//! mutation sends [`Descriptor`]s up the parent graph through
//! [`propagate`]; nothing is ever recomputed eagerly.

mod descriptor;
mod engine;

pub use descriptor::{CacheKey, Descriptor, DescriptorSet};
pub use engine::{propagate, InvalidationReport, InvalidationTarget};
