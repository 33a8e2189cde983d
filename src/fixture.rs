//! In-memory assembler for well-formed container buffers.
//!
//! Used by tests and the `demo` command of the CLI. Sections are appended
//! in call order; [`BufferBuilder::finish`] writes the string table, the
//! optional thumbnail and the positions table, then patches the header.
//!
//! ```
//! use scenepack::fixture::{BufferBuilder, ObjectSpec, Value};
//!
//! let mut b = BufferBuilder::new();
//! let at = b.position();
//! let root = b.object(
//!     &ObjectSpec::new("Node")
//!         .id("root")
//!         .field("count", Value::Int32(3))
//!         .field("me", Value::Ref(at)),
//! );
//! b.set_root(root);
//! let bytes = b.finish();
//! assert!(bytes.len() > 30);
//! ```

use std::collections::HashMap;
use std::path::Path;

use crate::container::{
    pack30, xref_shortcut, BEGIN_OBJ_MAGIC, END_OBJ_MAGIC, END_XREF_MAGIC, HEADER_MAGIC, HEADER_SIZE,
    POSITIONS_MAGIC, ROOT_SHORTCUT, STRINGS_MAGIC, STRINGS_SHORTCUT, THUMBNAIL_MAGIC, XREF_RECORD_MAGIC,
};
use crate::object::{decode_path, DecodePath, TypeTag, Version};
use crate::util::Result;
use crate::xref::XRefStyle;

/// A value to encode.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt8(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Packed(u32),
    Float32(f32),
    Float64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Point2([f64; 2]),
    Point3([f64; 3]),
    /// Radians.
    Angle(f64),
    /// RGBA in 0..=1.
    Color([f32; 4]),
    Transform { position: [f64; 3], mapping: Option<[f64; 9]> },
    Version(Version),
    Array(Vec<Value>),
    Object(ObjectSpec),
    /// Same-buffer reference to an absolute offset.
    Ref(i32),
    XRef { url: String, path: Option<String> },
    /// Tag byte followed by verbatim payload bytes.
    Raw { tag: u8, bytes: Vec<u8> },
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Array of references.
    pub fn refs(offsets: &[i32]) -> Self {
        Self::Array(offsets.iter().map(|&o| Self::Ref(o)).collect())
    }

    pub fn xref(url: impl Into<String>) -> Self {
        Self::XRef { url: url.into(), path: None }
    }
}

/// An object to encode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectSpec {
    pub type_name: String,
    pub id: Option<String>,
    pub fields: Vec<(String, Value)>,
}

impl ObjectSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), ..Default::default() }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Scene node with `children` and `components` reference arrays.
    pub fn node(id: impl Into<String>, children: &[i32], components: &[i32]) -> Self {
        Self::new("Node")
            .id(id)
            .field("children", Value::refs(children))
            .field("components", Value::refs(components))
    }
}

/// Appends sections to a buffer and finishes it with valid tables.
#[derive(Debug)]
pub struct BufferBuilder {
    version: Version,
    buf: Vec<u8>,
    strings: HashMap<String, u32>,
    string_order: Vec<String>,
    shortcuts: Vec<(String, u32)>,
    records: usize,
    root: Option<i32>,
    thumbnail: Option<Vec<u8>>,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferBuilder {
    /// Builder writing the current layout.
    pub fn new() -> Self {
        Self::with_version(Version::CURRENT)
    }

    /// Builder writing the layout of `version`; legacy value layouts follow
    /// the same table the decoder uses.
    pub fn with_version(version: Version) -> Self {
        Self {
            version,
            buf: vec![0; HEADER_SIZE],
            strings: HashMap::new(),
            string_order: Vec::new(),
            shortcuts: Vec::new(),
            records: 0,
            root: None,
            thumbnail: None,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Offset the next appended section will start at.
    pub fn position(&self) -> i32 {
        self.buf.len() as i32
    }

    /// Intern `s`, returning its id (never 0).
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.strings.get(s) {
            return id;
        }
        let id = self.string_order.len() as u32 + 1;
        self.strings.insert(s.to_string(), id);
        self.string_order.push(s.to_string());
        id
    }

    /// Append an object; returns its offset.
    pub fn object(&mut self, spec: &ObjectSpec) -> i32 {
        let at = self.position();
        let mut out = std::mem::take(&mut self.buf);
        self.write_object(&mut out, spec);
        self.buf = out;
        at
    }

    /// Mark the object at `offset` as the root.
    pub fn set_root(&mut self, offset: i32) {
        self.root = Some(offset);
    }

    /// Add an arbitrary shortcut entry.
    pub fn shortcut(&mut self, name: impl Into<String>, offset: i32) {
        self.shortcuts.push((name.into(), offset as u32));
    }

    /// Append an internalized cross-reference record; returns its index.
    pub fn xref_record(
        &mut self,
        url: &str,
        style: XRefStyle,
        hash_id: u32,
        encoding: &str,
        hash: &str,
        payload: &[u8],
    ) -> usize {
        let index = self.records;
        self.records += 1;
        let at = self.position();
        self.shortcuts.push((xref_shortcut(index), at as u32));

        let url = self.intern(url);
        let encoding = if encoding.is_empty() { 0 } else { self.intern(encoding) };
        let hash = if hash.is_empty() { 0 } else { self.intern(hash) };

        self.buf.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        pack30(url, &mut self.buf);
        self.buf.push(style.record_tag());
        pack30(hash_id, &mut self.buf);
        pack30(encoding, &mut self.buf);
        pack30(hash, &mut self.buf);
        self.buf.extend_from_slice(&XREF_RECORD_MAGIC.to_le_bytes());
        self.buf.extend_from_slice(payload);
        index
    }

    pub fn set_thumbnail(&mut self, bytes: Vec<u8>) {
        self.thumbnail = Some(bytes);
    }

    /// Write the trailing tables and the header.
    pub fn finish(mut self) -> Vec<u8> {
        let strings_at = self.position();
        self.buf.extend_from_slice(&STRINGS_MAGIC.to_le_bytes());
        pack30(self.string_order.len() as u32, &mut self.buf);
        for (i, s) in self.string_order.iter().enumerate() {
            pack30(s.len() as u32, &mut self.buf);
            self.buf.extend_from_slice(s.as_bytes());
            pack30(i as u32 + 1, &mut self.buf);
        }
        self.buf.extend_from_slice(&STRINGS_MAGIC.to_le_bytes());

        let thumbnail_at = match self.thumbnail.take() {
            Some(bytes) => {
                let at = self.position();
                self.buf.extend_from_slice(&THUMBNAIL_MAGIC.to_le_bytes());
                pack30(bytes.len() as u32, &mut self.buf);
                self.buf.extend_from_slice(&bytes);
                self.buf.extend_from_slice(&THUMBNAIL_MAGIC.to_le_bytes());
                at
            }
            None => 0,
        };

        let mut shortcuts = Vec::with_capacity(self.shortcuts.len() + 2);
        if let Some(root) = self.root {
            shortcuts.push((ROOT_SHORTCUT.to_string(), root as u32));
        }
        shortcuts.push((STRINGS_SHORTCUT.to_string(), strings_at as u32));
        shortcuts.append(&mut self.shortcuts);

        let positions_at = self.position();
        self.buf.extend_from_slice(&POSITIONS_MAGIC.to_le_bytes());
        pack30(shortcuts.len() as u32, &mut self.buf);
        for (name, offset) in &shortcuts {
            pack30(name.len() as u32, &mut self.buf);
            self.buf.extend_from_slice(name.as_bytes());
            pack30(*offset, &mut self.buf);
        }
        self.buf.extend_from_slice(&POSITIONS_MAGIC.to_le_bytes());

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        for part in [self.version.major, self.version.minor, self.version.patch] {
            header.extend_from_slice(&(part as u16).to_le_bytes());
        }
        header.extend_from_slice(&positions_at.to_le_bytes());
        header.extend_from_slice(&thumbnail_at.to_le_bytes());
        header.extend_from_slice(&[0; 8]);
        header.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        debug_assert_eq!(header.len(), HEADER_SIZE);
        self.buf[..HEADER_SIZE].copy_from_slice(&header);
        self.buf
    }

    /// Finish and write the buffer to `path`.
    pub fn write_to(self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.finish())?;
        Ok(())
    }

    fn write_object(&mut self, out: &mut Vec<u8>, spec: &ObjectSpec) {
        out.extend_from_slice(&BEGIN_OBJ_MAGIC.to_le_bytes());
        let type_id = self.intern(&spec.type_name);
        pack30(type_id, out);
        let id = match &spec.id {
            Some(id) => self.intern(id),
            None => 0,
        };
        pack30(id, out);
        pack30(spec.fields.len() as u32, out);
        for (key, value) in &spec.fields {
            let key = self.intern(key);
            pack30(key, out);
            self.write_value(out, value);
        }
        out.extend_from_slice(&END_OBJ_MAGIC.to_le_bytes());
    }

    fn write_value(&mut self, out: &mut Vec<u8>, value: &Value) {
        if let Value::Raw { tag, bytes } = value {
            out.push(*tag);
            out.extend_from_slice(bytes);
            return;
        }
        let tag = tag_of(value);
        out.push(tag.as_u8());
        let path = decode_path(tag, self.version);
        match value {
            Value::Null => {}
            Value::Bool(v) => out.push(*v as u8),
            Value::UInt8(v) => out.push(*v),
            Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Packed(v) => pack30(*v, out),
            Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Str(s) => {
                let id = self.intern(s);
                pack30(id, out);
            }
            Value::Bytes(b) => {
                match path {
                    DecodePath::Current => pack30(b.len() as u32, out),
                    _ => out.extend_from_slice(&(b.len() as i32).to_le_bytes()),
                }
                out.extend_from_slice(b);
            }
            Value::Point2(p) => write_reals(out, p, path),
            Value::Point3(p) => write_reals(out, p, path),
            Value::Angle(radians) => match path {
                DecodePath::Current => out.extend_from_slice(&radians.to_le_bytes()),
                _ => out.extend_from_slice(&(radians.to_degrees() as f32).to_le_bytes()),
            },
            Value::Color(c) => write_color(out, c, path),
            Value::Transform { position, mapping } => {
                write_reals(out, position, path);
                if path == DecodePath::Current {
                    match mapping {
                        Some(rows) => {
                            out.push(1);
                            for v in rows {
                                out.extend_from_slice(&v.to_le_bytes());
                            }
                        }
                        None => out.push(0),
                    }
                }
            }
            Value::Version(v) => {
                pack30(v.major, out);
                pack30(v.minor, out);
                pack30(v.patch, out);
            }
            Value::Array(items) => {
                pack30(items.len() as u32, out);
                for item in items {
                    self.write_value(out, item);
                }
            }
            Value::Object(spec) => self.write_object(out, spec),
            Value::Ref(offset) => out.extend_from_slice(&offset.to_le_bytes()),
            Value::XRef { url, path } => {
                let url = self.intern(url);
                pack30(url, out);
                let path = match path {
                    Some(p) => self.intern(p),
                    None => 0,
                };
                pack30(path, out);
                out.extend_from_slice(&END_XREF_MAGIC.to_le_bytes());
            }
            Value::Raw { .. } => {}
        }
    }
}

fn tag_of(value: &Value) -> TypeTag {
    match value {
        Value::Null | Value::Raw { .. } => TypeTag::Null,
        Value::Bool(_) => TypeTag::Bool,
        Value::UInt8(_) => TypeTag::UInt8,
        Value::Int16(_) => TypeTag::Int16,
        Value::Int32(_) => TypeTag::Int32,
        Value::Int64(_) => TypeTag::Int64,
        Value::UInt32(_) => TypeTag::UInt32,
        Value::Packed(_) => TypeTag::Packed,
        Value::Float32(_) => TypeTag::Float32,
        Value::Float64(_) => TypeTag::Float64,
        Value::Str(_) => TypeTag::Str,
        Value::Bytes(_) => TypeTag::Bytes,
        Value::Point2(_) => TypeTag::Point2,
        Value::Point3(_) => TypeTag::Point3,
        Value::Angle(_) => TypeTag::Angle,
        Value::Color(_) => TypeTag::Color,
        Value::Transform { .. } => TypeTag::Transform,
        Value::Version(_) => TypeTag::Version,
        Value::Array(_) => TypeTag::Array,
        Value::Object(_) => TypeTag::Object,
        Value::Ref(_) => TypeTag::Ref,
        Value::XRef { .. } => TypeTag::XRef,
    }
}

fn write_reals(out: &mut Vec<u8>, values: &[f64], path: DecodePath) {
    for v in values {
        match path {
            DecodePath::Current => out.extend_from_slice(&v.to_le_bytes()),
            _ => out.extend_from_slice(&(*v as f32).to_le_bytes()),
        }
    }
}

fn write_color(out: &mut Vec<u8>, c: &[f32; 4], path: DecodePath) {
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match path {
        DecodePath::Current => {
            for v in c {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        DecodePath::Legacy1 => out.extend_from_slice(&[byte(c[0]), byte(c[1]), byte(c[2])]),
        DecodePath::Legacy2 => out.extend_from_slice(&[byte(c[0]), byte(c[1]), byte(c[2]), byte(c[3])]),
        DecodePath::Legacy3 => {
            let argb = u32::from_be_bytes([byte(c[3]), byte(c[0]), byte(c[1]), byte(c[2])]);
            out.extend_from_slice(&argb.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Header, ShortcutTable, StringTable};

    #[test]
    fn test_tables_round_trip() {
        let mut b = BufferBuilder::new();
        let root = b.object(&ObjectSpec::new("Node").id("root"));
        b.set_root(root);
        b.set_thumbnail(vec![1, 2, 3]);
        let data = b.finish();

        let header = Header::parse(&data).unwrap();
        assert_eq!(header.version, Version::CURRENT);
        assert!(header.thumbnail_offset.is_some());
        let shortcuts = ShortcutTable::read(&data, header.positions_offset as usize).unwrap();
        assert_eq!(shortcuts.get(ROOT_SHORTCUT), Some(HEADER_SIZE));
        let strings = StringTable::read(&data, shortcuts.require(STRINGS_SHORTCUT).unwrap()).unwrap();
        assert_eq!(strings.len(), 2);
    }

    #[test]
    fn test_interning_is_stable() {
        let mut b = BufferBuilder::new();
        assert_eq!(b.intern("a"), 1);
        assert_eq!(b.intern("b"), 2);
        assert_eq!(b.intern("a"), 1);
    }
}
