//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use scenepack::fixture::{BufferBuilder, ObjectSpec, Value};
use scenepack::object::Document;
use scenepack::util::DecodeOptions;
use scenepack::xref::{MeshData, RawMeshCodec, XRefStyle};

pub fn open(name: &str, bytes: Vec<u8>) -> Arc<Document> {
    Arc::new(Document::from_bytes(name, bytes, DecodeOptions::default()).expect("open fixture"))
}

pub fn triangle() -> MeshData {
    MeshData {
        positions: vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, 0.5]],
        indices: vec![0, 1, 2],
    }
}

/// Offsets of the nodes in [`shared_scene`].
pub struct SharedScene {
    pub root: i32,
    pub left: i32,
    pub right: i32,
    pub shared: i32,
    pub leaf: i32,
}

/// `root -> {left, right}`, both parents of `shared`, which owns `leaf`.
///
/// `shared` carries an embedded triangle mesh; `right` shifts it along x.
pub fn shared_scene() -> (Vec<u8>, SharedScene) {
    let mut b = BufferBuilder::new();
    b.xref_record("meshes/tri.mesh", XRefStyle::Internal, 0, "", "", &RawMeshCodec::encode(&triangle()));

    let leaf_tags = b.object(&ObjectSpec::new("Tags").field("tags", Value::Array(vec![Value::str("leaf")])));
    let leaf = b.object(&ObjectSpec::node("leaf", &[], &[leaf_tags]));
    let mesh = b.object(
        &ObjectSpec::new("Mesh")
            .field("source", Value::xref("meshes/tri.mesh"))
            .field("levels", Value::Packed(0b0_0101)),
    );
    let shared = b.object(&ObjectSpec::node("shared", &[leaf], &[mesh]));
    let shift = b.object(
        &ObjectSpec::new("Transform").field("transform", Value::Transform { position: [10.0, 0.0, 0.0], mapping: None }),
    );
    let left = b.object(&ObjectSpec::node("left", &[shared], &[]));
    let right = b.object(&ObjectSpec::node("right", &[shared], &[shift]));
    let root = b.object(&ObjectSpec::node("root", &[left, right], &[]));
    b.set_root(root);
    (b.finish(), SharedScene { root, left, right, shared, leaf })
}
