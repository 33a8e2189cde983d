//! Per-extension payload loaders.
//!
//! A resolved cross-file target is a name and a byte blob. The
//! [`LoaderRegistry`] picks a [`PayloadLoader`] from the name's extension
//! and turns the bytes into a [`Payload`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::reference::extension;
use crate::object::Document;
use crate::util::{BBox3d, DVec3, DecodeOptions, FormatError, Result};

// ============================================================================
// Payloads
// ============================================================================

/// Decoded form of a resolved cross-file target.
#[derive(Clone)]
pub enum Payload {
    /// Encoded image; pixels stay with the host.
    Image(ImageData),
    /// Nested container document.
    Document(Arc<Document>),
    /// Opaque bytes.
    Raw(Arc<[u8]>),
    /// Triangle mesh produced by a mesh codec.
    Mesh(Arc<MeshData>),
}

impl Payload {
    /// Short name of the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Document(_) => "document",
            Self::Raw(_) => "raw",
            Self::Mesh(_) => "mesh",
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::Image(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Arc<Document>> {
        match self {
            Self::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&Arc<MeshData>> {
        match self {
            Self::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(i) => f.debug_tuple("Image").field(i).finish(),
            Self::Document(d) => f.debug_tuple("Document").field(&d.name()).finish(),
            Self::Raw(b) => write!(f, "Raw({} bytes)", b.len()),
            Self::Mesh(m) => f.debug_tuple("Mesh").field(m).finish(),
        }
    }
}

/// Encoded image bytes with whatever the header reveals.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    /// Lower-case file extension.
    pub format: String,
    /// Dimensions, when the header was recognized.
    pub size: Option<(u32, u32)>,
    pub bytes: Arc<[u8]>,
}

/// Vertex and index arrays of a triangle mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Bounding box of all vertices.
    pub fn bounds(&self) -> BBox3d {
        let mut b = BBox3d::EMPTY;
        for p in &self.positions {
            b.expand_by_point(DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64));
        }
        b
    }
}

// ============================================================================
// Loader Traits
// ============================================================================

/// Turns the bytes of a resolved target into a payload.
pub trait PayloadLoader: Send + Sync {
    /// Loader name, for diagnostics.
    fn name(&self) -> &str;

    /// Decode `bytes`; `target` names the resource in errors.
    fn load(&self, target: &str, bytes: Vec<u8>) -> Result<Payload>;
}

/// Opaque mesh codec: bytes in, vertex and index arrays out.
pub trait MeshCodec: Send + Sync {
    fn decode(&self, target: &str, bytes: &[u8]) -> Result<MeshData>;
}

// ============================================================================
// Built-in Loaders
// ============================================================================

/// Keeps encoded image bytes and sniffs dimensions from known headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageLoader;

impl PayloadLoader for ImageLoader {
    fn name(&self) -> &str {
        "image"
    }

    fn load(&self, target: &str, bytes: Vec<u8>) -> Result<Payload> {
        Ok(Payload::Image(ImageData {
            format: extension(target).unwrap_or_default(),
            size: sniff_image_size(&bytes),
            bytes: bytes.into(),
        }))
    }
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
const KTX2_SIGNATURE: [u8; 12] = [0xab, b'K', b'T', b'X', b' ', b'2', b'0', 0xbb, b'\r', b'\n', 0x1a, b'\n'];

/// Width and height from a PNG IHDR chunk or a KTX2 header.
fn sniff_image_size(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() >= 24 && bytes[..8] == PNG_SIGNATURE && &bytes[12..16] == b"IHDR" {
        return Some((BigEndian::read_u32(&bytes[16..20]), BigEndian::read_u32(&bytes[20..24])));
    }
    if bytes.len() >= 28 && bytes[..12] == KTX2_SIGNATURE {
        return Some((LittleEndian::read_u32(&bytes[20..24]), LittleEndian::read_u32(&bytes[24..28])));
    }
    None
}

/// Decodes nested container documents.
#[derive(Clone, Debug, Default)]
pub struct DocumentLoader {
    pub options: DecodeOptions,
}

impl PayloadLoader for DocumentLoader {
    fn name(&self) -> &str {
        "document"
    }

    fn load(&self, target: &str, bytes: Vec<u8>) -> Result<Payload> {
        let doc = Document::from_bytes(target, bytes, self.options.clone())?;
        Ok(Payload::Document(Arc::new(doc)))
    }
}

/// Passes bytes through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawLoader;

impl PayloadLoader for RawLoader {
    fn name(&self) -> &str {
        "raw"
    }

    fn load(&self, _target: &str, bytes: Vec<u8>) -> Result<Payload> {
        Ok(Payload::Raw(bytes.into()))
    }
}

/// Adapts a [`MeshCodec`] to the loader interface.
pub struct MeshLoader<C> {
    codec: C,
}

impl<C: MeshCodec> MeshLoader<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }
}

impl<C: MeshCodec> PayloadLoader for MeshLoader<C> {
    fn name(&self) -> &str {
        "mesh"
    }

    fn load(&self, target: &str, bytes: Vec<u8>) -> Result<Payload> {
        Ok(Payload::Mesh(Arc::new(self.codec.decode(target, &bytes)?)))
    }
}

/// Uncompressed mesh layout.
///
/// `u32 vertex count | u32 index count | count × 3 f32 | count × u32`,
/// little-endian.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawMeshCodec;

impl RawMeshCodec {
    const HEADER: usize = 8;

    /// Encode a mesh in this layout.
    pub fn encode(mesh: &MeshData) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER + mesh.positions.len() * 12 + mesh.indices.len() * 4);
        out.extend_from_slice(&(mesh.positions.len() as u32).to_le_bytes());
        out.extend_from_slice(&(mesh.indices.len() as u32).to_le_bytes());
        out.extend_from_slice(bytemuck::cast_slice(&mesh.positions));
        out.extend_from_slice(bytemuck::cast_slice(&mesh.indices));
        out
    }
}

impl MeshCodec for RawMeshCodec {
    fn decode(&self, target: &str, bytes: &[u8]) -> Result<MeshData> {
        let malformed = |reason: String| FormatError::MalformedPayload { target: target.to_string(), reason };

        if bytes.len() < Self::HEADER {
            return Err(malformed(format!("{} bytes is shorter than the mesh header", bytes.len())).into());
        }
        let vertices = LittleEndian::read_u32(&bytes[0..4]) as usize;
        let indices = LittleEndian::read_u32(&bytes[4..8]) as usize;
        let pos_len = vertices.checked_mul(12).ok_or_else(|| malformed("vertex count overflows".into()))?;
        let idx_len = indices.checked_mul(4).ok_or_else(|| malformed("index count overflows".into()))?;
        let expected = Self::HEADER + pos_len + idx_len;
        if bytes.len() != expected {
            return Err(malformed(format!("expected {expected} bytes, found {}", bytes.len())).into());
        }

        // Payload slices are not aligned; collect copies instead of casting in place.
        let pos_bytes = &bytes[Self::HEADER..Self::HEADER + pos_len];
        let positions: Vec<[f32; 3]> = bytemuck::pod_collect_to_vec(pos_bytes);
        let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[Self::HEADER + pos_len..]);

        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(malformed(format!("index {bad} out of range for {vertices} vertices")).into());
        }
        if indices.len() % 3 != 0 {
            return Err(malformed(format!("{} indices do not form triangles", indices.len())).into());
        }
        Ok(MeshData { positions, indices })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Extension → loader table.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn PayloadLoader>>,
}

impl LoaderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with images, nested documents, raw meshes and raw blobs.
    pub fn with_defaults(options: DecodeOptions) -> Self {
        let mut reg = Self::new();
        let image: Arc<dyn PayloadLoader> = Arc::new(ImageLoader);
        for ext in ["png", "jpg", "jpeg", "webp", "ktx2"] {
            reg.register_shared(ext, image.clone());
        }
        reg.register("scp", DocumentLoader { options });
        reg.register("mesh", MeshLoader::new(RawMeshCodec));
        reg.register("bin", RawLoader);
        reg
    }

    /// Register `loader` for `ext` (case-insensitive), replacing any previous one.
    pub fn register(&mut self, ext: &str, loader: impl PayloadLoader + 'static) {
        self.register_shared(ext, Arc::new(loader));
    }

    pub fn register_shared(&mut self, ext: &str, loader: Arc<dyn PayloadLoader>) {
        self.loaders.insert(ext.trim_start_matches('.').to_ascii_lowercase(), loader);
    }

    /// Loader for the extension of `target`.
    pub fn loader_for(&self, target: &str) -> Result<Arc<dyn PayloadLoader>> {
        let ext = extension(target).unwrap_or_default();
        match self.loaders.get(&ext) {
            Some(l) => Ok(l.clone()),
            None => Err(FormatError::MissingLoader { extension: ext, target: target.to_string() }.into()),
        }
    }

    /// Decode `bytes` with the loader for `target`'s extension.
    pub fn load(&self, target: &str, bytes: Vec<u8>) -> Result<Payload> {
        self.loader_for(target)?.load(target, bytes)
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.loaders.contains_key(&ext.to_ascii_lowercase())
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry").field("extensions", &self.extensions()).finish()
    }
}
