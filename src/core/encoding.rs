//! # Value Codec
//!
//! Tag-driven binary encoding of [`Value`]s and the object graphs they point at.
//!
//! ## Wire Format
//! ```text
//! Null      [0x00]
//! Bool      [0x01][0|1]
//! I8..F64   [tag][big-endian scalar]
//! Str       [0x08][u32 len][UTF-8]
//! Bytes     [0x09][u32 len][raw]
//! Array     [0x0A][u32 count][Value..]
//! Map       [0x0B][u32 count][(Value, Value)..]
//! ObjectRef [0x0C][u32 id]
//! Object    [0x0D][u32 len][type name][u32 id][u32 count][(u32 len, name, Value)..]
//! ```
//!
//! ## Identity
//! The encoder keeps a per-message table from heap slot to wire id. The first
//! encounter of an object assigns the next sequential id and writes the full
//! object; every later encounter (a self-reference included) writes `ObjectRef`.
//!
//! The decoder constructs each object and registers its id *before* decoding
//! its fields, so references met while populating the fields resolve to the
//! instance under construction. Ids are required to arrive in order from 0.
//!
//! ## Limits
//! Every length read from the wire is checked against [`CodecConfig`] before
//! anything is allocated for it.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::CodecConfig;
use crate::core::heap::Heap;
use crate::core::mutator::FrozenRegistry;
use crate::core::value::{ObjectId, Tag, Value};
use crate::error::constants::{ERR_INVALID_UTF8, ERR_TRAILING_BYTES, ERR_TRUNCATED};
use crate::error::EncodingError;

/// Shared, immutable codec state: limits plus the frozen mutator registry.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    limits: CodecConfig,
    mutators: Arc<FrozenRegistry>,
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default(), FrozenRegistry::generic())
    }
}

impl ValueCodec {
    pub fn new(limits: CodecConfig, mutators: Arc<FrozenRegistry>) -> Self {
        Self { limits, mutators }
    }

    pub fn limits(&self) -> &CodecConfig {
        &self.limits
    }

    pub fn mutators(&self) -> &Arc<FrozenRegistry> {
        &self.mutators
    }

    /// Append `[u32 count][values..]` to `dst`.
    ///
    /// All values share one identity table. On error `dst` may hold a partial
    /// encoding; callers encode into a scratch buffer and discard it.
    pub fn encode_params(
        &self,
        values: &[Value],
        heap: &Heap,
        dst: &mut BytesMut,
    ) -> Result<(), EncodingError> {
        check_limit("parameter count", values.len(), self.limits.max_collection_len)?;
        dst.put_u32(values.len() as u32);
        let mut encoder = ValueEncoder::new(self, heap);
        for value in values {
            encoder.encode(value, dst)?;
        }
        Ok(())
    }

    /// Decode `[u32 count][values..]`, which must span all of `input`.
    pub fn decode_params(&self, input: &[u8]) -> Result<(Vec<Value>, Heap), EncodingError> {
        let mut decoder = ValueDecoder::new(self, input);
        let count = decoder.reader.read_len("parameter count", self.limits.max_collection_len)?;
        let mut values = Vec::with_capacity(count.min(decoder.reader.remaining()));
        for _ in 0..count {
            values.push(decoder.decode()?);
        }
        let heap = decoder.finish()?;
        Ok((values, heap))
    }

    /// Encode a single value with a fresh identity table.
    pub fn encode_value(&self, value: &Value, heap: &Heap) -> Result<Bytes, EncodingError> {
        let mut dst = BytesMut::new();
        ValueEncoder::new(self, heap).encode(value, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Decode exactly one value spanning all of `input`.
    pub fn decode_value(&self, input: &[u8]) -> Result<(Value, Heap), EncodingError> {
        let mut decoder = ValueDecoder::new(self, input);
        let value = decoder.decode()?;
        let heap = decoder.finish()?;
        Ok((value, heap))
    }
}

fn check_limit(what: &'static str, len: usize, max: usize) -> Result<(), EncodingError> {
    if len > max || len > u32::MAX as usize {
        return Err(EncodingError::SizeLimitExceeded { what, len, max });
    }
    Ok(())
}

/// Depth-first encoder over one heap.
pub struct ValueEncoder<'a> {
    codec: &'a ValueCodec,
    heap: &'a Heap,
    identity: HashMap<ObjectId, u32>,
}

impl<'a> ValueEncoder<'a> {
    pub fn new(codec: &'a ValueCodec, heap: &'a Heap) -> Self {
        Self {
            codec,
            heap,
            identity: HashMap::new(),
        }
    }

    pub fn encode(&mut self, value: &Value, dst: &mut BytesMut) -> Result<(), EncodingError> {
        self.encode_at(value, dst, 0)
    }

    fn encode_at(
        &mut self,
        value: &Value,
        dst: &mut BytesMut,
        depth: usize,
    ) -> Result<(), EncodingError> {
        let limits = &self.codec.limits;
        match value {
            Value::Null => dst.put_u8(Tag::Null as u8),
            Value::Bool(b) => {
                dst.put_u8(Tag::Bool as u8);
                dst.put_u8(u8::from(*b));
            }
            Value::I8(v) => {
                dst.put_u8(Tag::I8 as u8);
                dst.put_i8(*v);
            }
            Value::I16(v) => {
                dst.put_u8(Tag::I16 as u8);
                dst.put_i16(*v);
            }
            Value::I32(v) => {
                dst.put_u8(Tag::I32 as u8);
                dst.put_i32(*v);
            }
            Value::I64(v) => {
                dst.put_u8(Tag::I64 as u8);
                dst.put_i64(*v);
            }
            Value::F32(v) => {
                dst.put_u8(Tag::F32 as u8);
                dst.put_f32(*v);
            }
            Value::F64(v) => {
                dst.put_u8(Tag::F64 as u8);
                dst.put_f64(*v);
            }
            Value::Str(s) => {
                dst.put_u8(Tag::Str as u8);
                put_str(dst, "string", s, limits.max_string_len)?;
            }
            Value::Bytes(b) => {
                check_limit("bytes", b.len(), limits.max_bytes_len)?;
                dst.put_u8(Tag::Bytes as u8);
                dst.put_u32(b.len() as u32);
                dst.put_slice(b);
            }
            Value::Array(items) => {
                let depth = self.enter(depth)?;
                check_limit("array", items.len(), limits.max_collection_len)?;
                dst.put_u8(Tag::Array as u8);
                dst.put_u32(items.len() as u32);
                for item in items {
                    self.encode_at(item, dst, depth)?;
                }
            }
            Value::Map(entries) => {
                let depth = self.enter(depth)?;
                check_limit("map", entries.len(), limits.max_collection_len)?;
                dst.put_u8(Tag::Map as u8);
                dst.put_u32(entries.len() as u32);
                for (k, v) in entries {
                    self.encode_at(k, dst, depth)?;
                    self.encode_at(v, dst, depth)?;
                }
            }
            Value::Object(id) => self.encode_object(*id, dst, depth)?,
        }
        Ok(())
    }

    fn encode_object(
        &mut self,
        id: ObjectId,
        dst: &mut BytesMut,
        depth: usize,
    ) -> Result<(), EncodingError> {
        if let Some(wire_id) = self.identity.get(&id) {
            dst.put_u8(Tag::ObjectRef as u8);
            dst.put_u32(*wire_id);
            return Ok(());
        }

        let depth = self.enter(depth)?;
        let heap = self.heap;
        let codec = self.codec;
        let (type_name, instance) = match (heap.type_name(id), heap.object(id)) {
            (Some(t), Some(o)) => (t, o),
            _ => {
                return Err(EncodingError::InvalidEncoding(format!(
                    "dangling object handle {id}"
                )))
            }
        };

        // Registered before the fields so that back-references find it.
        let wire_id = self.identity.len() as u32;
        self.identity.insert(id, wire_id);

        let reader = codec.mutators.resolve_reader(type_name, instance)?;
        let fields = reader.fields(type_name, instance)?;
        check_limit("field count", fields.len(), codec.limits.max_fields)?;

        dst.put_u8(Tag::Object as u8);
        put_str(dst, "type name", type_name, codec.limits.max_string_len)?;
        dst.put_u32(wire_id);
        dst.put_u32(fields.len() as u32);
        for name in &fields {
            put_str(dst, "field name", name, codec.limits.max_string_len)?;
            let value = reader.get(instance, name)?;
            self.encode_at(&value, dst, depth)?;
        }
        Ok(())
    }

    fn enter(&self, depth: usize) -> Result<usize, EncodingError> {
        let next = depth + 1;
        check_limit("nesting depth", next, self.codec.limits.max_depth)?;
        Ok(next)
    }
}

fn put_str(
    dst: &mut BytesMut,
    what: &'static str,
    s: &str,
    max: usize,
) -> Result<(), EncodingError> {
    check_limit(what, s.len(), max)?;
    dst.put_u32(s.len() as u32);
    dst.put_slice(s.as_bytes());
    Ok(())
}

/// Bounds-checked cursor over an input slice.
#[derive(Debug)]
pub(crate) struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], EncodingError> {
        if self.remaining() < n {
            return Err(EncodingError::InvalidEncoding(ERR_TRUNCATED.to_string()));
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], EncodingError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, EncodingError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, EncodingError> {
        self.array().map(u32::from_be_bytes)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, EncodingError> {
        self.array().map(u64::from_be_bytes)
    }

    /// Read a `u32` length and check it against `max`.
    pub(crate) fn read_len(&mut self, what: &'static str, max: usize) -> Result<usize, EncodingError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(EncodingError::SizeLimitExceeded { what, len, max });
        }
        Ok(len)
    }

    pub(crate) fn read_str(&mut self, what: &'static str, max: usize) -> Result<String, EncodingError> {
        let len = self.read_len(what, max)?;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| EncodingError::InvalidEncoding(ERR_INVALID_UTF8.to_string()))
    }
}

/// Recursive-descent decoder that builds a fresh heap.
pub struct ValueDecoder<'a> {
    codec: &'a ValueCodec,
    reader: Reader<'a>,
    heap: Heap,
    identity: Vec<ObjectId>,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(codec: &'a ValueCodec, input: &'a [u8]) -> Self {
        Self {
            codec,
            reader: Reader::new(input),
            heap: Heap::new(),
            identity: Vec::new(),
        }
    }

    pub fn decode(&mut self) -> Result<Value, EncodingError> {
        self.decode_at(0)
    }

    /// Finish decoding and hand over the heap. Unread input is an error.
    pub fn finish(self) -> Result<Heap, EncodingError> {
        if self.reader.remaining() != 0 {
            return Err(EncodingError::InvalidEncoding(format!(
                "{ERR_TRAILING_BYTES} ({} bytes)",
                self.reader.remaining()
            )));
        }
        Ok(self.heap)
    }

    fn enter(&self, depth: usize) -> Result<usize, EncodingError> {
        let next = depth + 1;
        check_limit("nesting depth", next, self.codec.limits.max_depth)?;
        Ok(next)
    }

    fn decode_at(&mut self, depth: usize) -> Result<Value, EncodingError> {
        let limits = &self.codec.limits;
        let tag = Tag::try_from(self.reader.read_u8()?)?;
        let value = match tag {
            Tag::Null => Value::Null,
            Tag::Bool => match self.reader.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(EncodingError::InvalidEncoding(format!(
                        "bool byte must be 0 or 1, got {other}"
                    )))
                }
            },
            Tag::I8 => Value::I8(i8::from_be_bytes(self.reader.array()?)),
            Tag::I16 => Value::I16(i16::from_be_bytes(self.reader.array()?)),
            Tag::I32 => Value::I32(i32::from_be_bytes(self.reader.array()?)),
            Tag::I64 => Value::I64(i64::from_be_bytes(self.reader.array()?)),
            Tag::F32 => Value::F32(f32::from_be_bytes(self.reader.array()?)),
            Tag::F64 => Value::F64(f64::from_be_bytes(self.reader.array()?)),
            Tag::Str => Value::Str(self.reader.read_str("string", limits.max_string_len)?),
            Tag::Bytes => {
                let len = self.reader.read_len("bytes", limits.max_bytes_len)?;
                Value::Bytes(Bytes::copy_from_slice(self.reader.take(len)?))
            }
            Tag::Array => {
                let depth = self.enter(depth)?;
                let count = self.reader.read_len("array", limits.max_collection_len)?;
                let mut items = Vec::with_capacity(count.min(self.reader.remaining()));
                for _ in 0..count {
                    items.push(self.decode_at(depth)?);
                }
                Value::Array(items)
            }
            Tag::Map => {
                let depth = self.enter(depth)?;
                let count = self.reader.read_len("map", limits.max_collection_len)?;
                let mut entries = Vec::with_capacity(count.min(self.reader.remaining() / 2));
                for _ in 0..count {
                    let k = self.decode_at(depth)?;
                    let v = self.decode_at(depth)?;
                    entries.push((k, v));
                }
                Value::Map(entries)
            }
            Tag::ObjectRef => {
                let wire_id = self.reader.read_u32()?;
                let id = self
                    .identity
                    .get(wire_id as usize)
                    .copied()
                    .ok_or(EncodingError::UnresolvedReference(wire_id))?;
                Value::Object(id)
            }
            Tag::Object => Value::Object(self.decode_object(depth)?),
        };
        Ok(value)
    }

    fn decode_object(&mut self, depth: usize) -> Result<ObjectId, EncodingError> {
        let depth = self.enter(depth)?;
        let codec = self.codec;
        let max_name = codec.limits.max_string_len;

        let type_name = self.reader.read_str("type name", max_name)?;
        let wire_id = self.reader.read_u32()?;
        if wire_id as usize != self.identity.len() {
            return Err(EncodingError::InvalidEncoding(format!(
                "object id {wire_id} out of sequence (expected {})",
                self.identity.len()
            )));
        }

        let writer = codec.mutators.resolve_writer(&type_name)?;
        let instance = writer.construct(&type_name)?;
        let id = self.heap.insert_boxed(type_name, instance);
        self.identity.push(id);

        let count = self.reader.read_len("field count", codec.limits.max_fields)?;
        for _ in 0..count {
            let name = self.reader.read_str("field name", max_name)?;
            let value = self.decode_at(depth)?;
            let instance = self.heap.object_mut(id).ok_or_else(|| {
                EncodingError::InvalidEncoding(format!("object {id} vanished while decoding"))
            })?;
            writer.set(instance, &name, value)?;
        }
        Ok(id)
    }
}
