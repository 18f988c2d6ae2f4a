//! The tagged value model.
//!
//! A [`Value`] is either a scalar, a container, or a handle to an object that
//! lives in the message's [`Heap`](crate::core::heap::Heap). Object handles are
//! plain indices, so cyclic graphs need no shared ownership.

use bytes::Bytes;

use crate::error::EncodingError;

/// Index of an object inside one [`Heap`](crate::core::heap::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Wire tags, one byte each.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Null = 0x00,
    Bool = 0x01,
    I8 = 0x02,
    I16 = 0x03,
    I32 = 0x04,
    I64 = 0x05,
    F32 = 0x06,
    F64 = 0x07,
    Str = 0x08,
    Bytes = 0x09,
    Array = 0x0A,
    Map = 0x0B,
    ObjectRef = 0x0C,
    Object = 0x0D,
}

impl TryFrom<u8> for Tag {
    type Error = EncodingError;

    fn try_from(byte: u8) -> Result<Self, EncodingError> {
        Ok(match byte {
            0x00 => Tag::Null,
            0x01 => Tag::Bool,
            0x02 => Tag::I8,
            0x03 => Tag::I16,
            0x04 => Tag::I32,
            0x05 => Tag::I64,
            0x06 => Tag::F32,
            0x07 => Tag::F64,
            0x08 => Tag::Str,
            0x09 => Tag::Bytes,
            0x0A => Tag::Array,
            0x0B => Tag::Map,
            0x0C => Tag::ObjectRef,
            0x0D => Tag::Object,
            other => return Err(EncodingError::UnknownTag(other)),
        })
    }
}

/// Any serializable datum.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    /// Ordered key/value pairs; keys may be any value.
    Map(Vec<(Value, Value)>),
    /// Handle into the heap that travels with this value.
    Object(ObjectId),
}

impl Value {
    /// Short name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(v) => Some(i64::from(*v)),
            Value::I16(v) => Some(i64::from(*v)),
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Str,
    &str => Str,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    Vec<Value> => Array,
    ObjectId => Object,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

macro_rules! impl_try_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = EncodingError;

                fn try_from(value: Value) -> Result<Self, EncodingError> {
                    let kind = value.kind_name();
                    let $v = value;
                    $body.ok_or_else(|| {
                        EncodingError::FieldAccess(format!(
                            "expected {}, found {kind}",
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

impl_try_from! {
    bool => |v| v.as_bool(),
    i64 => |v| v.as_i64(),
    i32 => |v| v.as_i64().and_then(|n| i32::try_from(n).ok()),
    f64 => |v| v.as_f64(),
    String => |v| match v {
        Value::Str(s) => Some(s),
        _ => None,
    },
    Bytes => |v| match v {
        Value::Bytes(b) => Some(b),
        _ => None,
    },
    ObjectId => |v| v.as_object(),
    Vec<Value> => |v| match v {
        Value::Array(items) => Some(items),
        _ => None,
    },
}
