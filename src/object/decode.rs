//! Typed value and object decoding.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::arena::{ObjectArena, ObjectHandle, Staging};
use super::entity::{DocumentObject, Entity, RefToken};
use super::tag::TypeTag;
use super::version::{decode_path, DecodePath, Version};
use crate::container::{
    is_valid_target, StreamReader, StringTable, BEGIN_OBJ_MAGIC, END_OBJ_MAGIC, END_XREF_MAGIC,
};
use crate::util::{Angle, Color, DMat3, DVec2, DVec3, DecodeOptions, FormatError, Transform};
use crate::xref::{XRef, XRefRecord};

type Result<T> = crate::util::Result<T>;

/// One decode pass over a buffer, staging every object it meets.
pub(crate) struct Decoder<'a> {
    data: &'a [u8],
    strings: &'a StringTable,
    version: Version,
    options: &'a DecodeOptions,
    records: &'a [XRefRecord],
    records_by_url: &'a HashMap<Arc<str>, usize>,
    arena: &'a ObjectArena,
    staging: Staging,
}

/// Read-only inputs shared by every decode of one document.
pub(crate) struct DecodeContext<'a> {
    pub data: &'a [u8],
    pub strings: &'a StringTable,
    pub version: Version,
    pub options: &'a DecodeOptions,
    pub records: &'a [XRefRecord],
    pub records_by_url: &'a HashMap<Arc<str>, usize>,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(ctx: &DecodeContext<'a>, arena: &'a ObjectArena) -> Self {
        Self {
            data: ctx.data,
            strings: ctx.strings,
            version: ctx.version,
            options: ctx.options,
            records: ctx.records,
            records_by_url: ctx.records_by_url,
            arena,
            staging: arena.stage(),
        }
    }

    /// Decode the object at `offset`; `at` is where the request came from.
    ///
    /// Returns the handle and the staged batch to commit.
    pub(crate) fn decode_object_at(mut self, offset: i32, at: usize) -> Result<(ObjectHandle, Staging)> {
        if !is_valid_target(offset, self.data.len()) {
            return Err(FormatError::InvalidReference { target: offset, at }.into());
        }
        let mut r = StreamReader::at(self.data, offset as usize);
        let handle = self.object(&mut r, 0)?;
        trace!(offset, staged = self.staging.len(), "decoded object");
        Ok((handle, self.staging))
    }

    fn object(&mut self, r: &mut StreamReader<'a>, depth: usize) -> Result<ObjectHandle> {
        let start = r.position();
        let offset = start as i32;

        // Already decoded: reuse the instance and skip its bytes.
        if let Some(h) = self.arena.object_at(offset)? {
            if let Some(obj) = self.arena.get(h) {
                r.set_position(obj.end());
                return Ok(h);
            }
        }
        if let Some(h) = self.staging.object_at(offset) {
            if let Some(end) = self.staging.end_of(h) {
                r.set_position(end);
                return Ok(h);
            }
        }

        r.match_magic(BEGIN_OBJ_MAGIC)?;
        let type_offset = r.position();
        let type_name = self.strings.require(r.read_unpack30()?, type_offset)?;
        let id_offset = r.position();
        let id = self.strings.resolve(r.read_unpack30()?, id_offset)?;

        let count = r.read_count()?;
        if count > self.options.max_array_len {
            let limit = self.options.max_array_len;
            return Err(FormatError::ArrayTooLong { len: count, limit, offset: start }.into());
        }
        let mut fields = HashMap::with_capacity(count.min(256));
        for _ in 0..count {
            let key_offset = r.position();
            let key = self.strings.require(r.read_unpack30()?, key_offset)?;
            let value = self.value(r, depth)?;
            fields.insert(key, value);
        }
        r.match_magic(END_OBJ_MAGIC)?;

        Ok(self.staging.push(DocumentObject {
            offset,
            end: r.position(),
            type_name,
            id,
            fields,
        }))
    }

    fn value(&mut self, r: &mut StreamReader<'a>, depth: usize) -> Result<Entity> {
        let tag_offset = r.position();
        let raw = r.read_u8()?;
        let tag = TypeTag::from_u8(raw).ok_or(FormatError::UnknownTypeTag { tag: raw, offset: tag_offset })?;
        let path = decode_path(tag, self.version);

        let entity = match tag {
            TypeTag::Null => Entity::Null,
            TypeTag::Bool => Entity::Bool(r.read_bool()?),
            TypeTag::UInt8 => Entity::UInt8(r.read_u8()?),
            TypeTag::Int16 => Entity::Int16(r.read_i16()?),
            TypeTag::Int32 => Entity::Int32(r.read_i32()?),
            TypeTag::Int64 => Entity::Int64(r.read_i64()?),
            TypeTag::UInt32 => Entity::UInt32(r.read_u32()?),
            TypeTag::Packed => Entity::Packed(r.read_unpack30()?),
            TypeTag::Float32 => Entity::Float32(r.read_f32()?),
            TypeTag::Float64 => Entity::Float64(r.read_f64()?),
            TypeTag::Str => {
                let at = r.position();
                match self.strings.resolve(r.read_unpack30()?, at)? {
                    Some(s) => Entity::Str(s),
                    None => Entity::Null,
                }
            }
            TypeTag::Bytes => Entity::Bytes(Arc::from(self.bytes(r, path)?)),
            TypeTag::Point2 => Entity::Point2(match path {
                DecodePath::Current => DVec2::from_array(r.read_f64_array::<2>()?),
                _ => DVec2::from_array(r.read_f32_array::<2>()?.map(f64::from)),
            }),
            TypeTag::Point3 => Entity::Point3(self.point3(r, path)?),
            TypeTag::Angle => Entity::Angle(match path {
                DecodePath::Current => Angle::from_radians(r.read_f64()?),
                _ => Angle::from_degrees(r.read_f32()? as f64),
            }),
            TypeTag::Color => Entity::Color(self.color(r, path)?),
            TypeTag::Transform => Entity::Transform(self.transform(r, path)?),
            TypeTag::Version => {
                Entity::Version(Version::new(r.read_unpack30()?, r.read_unpack30()?, r.read_unpack30()?))
            }
            TypeTag::Array => {
                self.check_depth(depth, tag_offset)?;
                let count = r.read_count()?;
                if count > self.options.max_array_len {
                    return Err(FormatError::ArrayTooLong {
                        len: count,
                        limit: self.options.max_array_len,
                        offset: tag_offset,
                    }
                    .into());
                }
                let mut items = Vec::with_capacity(count.min(r.remaining()));
                for _ in 0..count {
                    items.push(self.value(r, depth + 1)?);
                }
                Entity::Array(items)
            }
            TypeTag::Object => {
                self.check_depth(depth, tag_offset)?;
                Entity::Object(self.object(r, depth + 1)?)
            }
            TypeTag::Ref => {
                let at = r.position();
                let target = r.read_i32()?;
                if !is_valid_target(target, self.data.len()) {
                    return Err(FormatError::InvalidReference { target, at }.into());
                }
                Entity::Ref(RefToken { target, at })
            }
            TypeTag::XRef => {
                let url_offset = r.position();
                let url = self.strings.require(r.read_unpack30()?, url_offset)?;
                let path_offset = r.position();
                let sub_path = self.strings.resolve(r.read_unpack30()?, path_offset)?;
                r.match_magic(END_XREF_MAGIC)?;
                Entity::XRef(match self.records_by_url.get(&url) {
                    Some(&index) => XRef::internalized(url, sub_path, self.records[index].style, index),
                    None => XRef::external(url, sub_path),
                })
            }
        };
        Ok(entity)
    }

    fn check_depth(&self, depth: usize, offset: usize) -> Result<()> {
        if depth >= self.options.max_inline_depth {
            return Err(FormatError::NestingTooDeep { limit: self.options.max_inline_depth, offset }.into());
        }
        Ok(())
    }

    fn bytes(&mut self, r: &mut StreamReader<'a>, path: DecodePath) -> Result<&'a [u8]> {
        match path {
            DecodePath::Current => Ok(r.read_bytes()?),
            _ => {
                let len = r.read_i32()?;
                let len = usize::try_from(len)
                    .map_err(|_| FormatError::InvalidSection { section: "bytes", offset: len })?;
                Ok(r.take(len)?)
            }
        }
    }

    fn point3(&mut self, r: &mut StreamReader<'a>, path: DecodePath) -> Result<DVec3> {
        Ok(match path {
            DecodePath::Current => DVec3::from_array(r.read_f64_array::<3>()?),
            _ => DVec3::from_array(r.read_f32_array::<3>()?.map(f64::from)),
        })
    }

    fn color(&mut self, r: &mut StreamReader<'a>, path: DecodePath) -> Result<Color> {
        Ok(match path {
            DecodePath::Current => {
                let [cr, cg, cb, ca] = r.read_f32_array::<4>()?;
                Color::new(cr, cg, cb, ca)
            }
            DecodePath::Legacy1 => {
                let rgb = r.take(3)?;
                Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255)
            }
            DecodePath::Legacy2 => {
                let rgba = r.take(4)?;
                Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
            }
            DecodePath::Legacy3 => Color::from_argb32(r.read_u32()?),
        })
    }

    fn transform(&mut self, r: &mut StreamReader<'a>, path: DecodePath) -> Result<Transform> {
        let position = self.point3(r, path)?;
        if path != DecodePath::Current {
            return Ok(Transform::from_position(position));
        }
        if !r.read_bool()? {
            return Ok(Transform::from_position(position));
        }
        // Stored row-major.
        let rows = r.read_f64_array::<9>()?;
        Ok(Transform::new(position, DMat3::from_cols_array(&rows).transpose()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{Error, InvariantViolation};

    #[test]
    fn test_object_over_record_reports_kind_mismatch() {
        let data = vec![0u8; 200];
        let strings = StringTable::default();
        let options = DecodeOptions::default();
        let records_by_url = HashMap::new();
        let ctx = DecodeContext {
            data: &data,
            strings: &strings,
            version: Version::CURRENT,
            options: &options,
            records: &[],
            records_by_url: &records_by_url,
        };
        let mut arena = ObjectArena::new();
        arena.register_record(100, 0).unwrap();

        let Err(err) = Decoder::new(&ctx, &arena).decode_object_at(100, 40) else {
            panic!("expected a kind mismatch");
        };
        assert!(matches!(
            err,
            Error::Invariant(InvariantViolation::CachedKindMismatch { offset: 100, requested: "object", .. })
        ));
    }
}
