//! Storable values - the typed payloads written into dynamic record chains
//!
//! Every value encodes to a blob that starts with a one-byte type tag:
//!
//! ```text
//! scalar        [tag][big-endian value]
//! string/bytes  [tag][raw bytes]
//! array         [tag | 0x10][element][element]...
//! string array  [0x19][count u32][len u32][utf-8]...
//! ```
//!
//! Floats are stored by their bit pattern, so decoding reproduces NaN
//! payloads and signed zeros exactly.

use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const TAG_BOOL: u8 = 0x01;
const TAG_BYTE: u8 = 0x02;
const TAG_SHORT: u8 = 0x03;
const TAG_CHAR: u8 = 0x04;
const TAG_INT: u8 = 0x05;
const TAG_LONG: u8 = 0x06;
const TAG_FLOAT: u8 = 0x07;
const TAG_DOUBLE: u8 = 0x08;
const TAG_STRING: u8 = 0x09;
const TAG_BYTES: u8 = 0x0A;
const ARRAY: u8 = 0x10;

/// Shape of the encoded body behind a type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Fixed-width scalar of this many bytes
    Scalar(usize),
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
    /// Any array variant
    Array,
    /// Not a tag this crate writes
    Unknown,
}

/// Classify a type tag without decoding a value
pub fn tag_kind(tag: u8) -> TagKind {
    match tag {
        TAG_BOOL | TAG_BYTE => TagKind::Scalar(1),
        TAG_SHORT => TagKind::Scalar(2),
        TAG_CHAR | TAG_INT | TAG_FLOAT => TagKind::Scalar(4),
        TAG_LONG | TAG_DOUBLE => TagKind::Scalar(8),
        TAG_STRING => TagKind::String,
        TAG_BYTES => TagKind::Bytes,
        t if t & ARRAY != 0 && (t & !ARRAY) >= TAG_BOOL && (t & !ARRAY) <= TAG_STRING => {
            TagKind::Array
        }
        _ => TagKind::Unknown,
    }
}

/// A value that can be stored in a dynamic record chain
#[derive(Debug, Clone, PartialEq)]
pub enum StorableValue {
    /// Boolean
    Bool(bool),
    /// Signed byte
    Byte(i8),
    /// 16-bit integer
    Short(i16),
    /// Unicode scalar value
    Char(char),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 text
    String(String),
    /// Uninterpreted bytes
    Bytes(Vec<u8>),
    /// Array of booleans
    BoolArray(Vec<bool>),
    /// Array of signed bytes
    ByteArray(Vec<i8>),
    /// Array of 16-bit integers
    ShortArray(Vec<i16>),
    /// Array of chars
    CharArray(Vec<char>),
    /// Array of 32-bit integers
    IntArray(Vec<i32>),
    /// Array of 64-bit integers
    LongArray(Vec<i64>),
    /// Array of 32-bit floats
    FloatArray(Vec<f32>),
    /// Array of 64-bit floats
    DoubleArray(Vec<f64>),
    /// Array of strings
    StringArray(Vec<String>),
}

impl StorableValue {
    /// Leading type tag of the encoded form
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => TAG_BOOL,
            Self::Byte(_) => TAG_BYTE,
            Self::Short(_) => TAG_SHORT,
            Self::Char(_) => TAG_CHAR,
            Self::Int(_) => TAG_INT,
            Self::Long(_) => TAG_LONG,
            Self::Float(_) => TAG_FLOAT,
            Self::Double(_) => TAG_DOUBLE,
            Self::String(_) => TAG_STRING,
            Self::Bytes(_) => TAG_BYTES,
            Self::BoolArray(_) => ARRAY | TAG_BOOL,
            Self::ByteArray(_) => ARRAY | TAG_BYTE,
            Self::ShortArray(_) => ARRAY | TAG_SHORT,
            Self::CharArray(_) => ARRAY | TAG_CHAR,
            Self::IntArray(_) => ARRAY | TAG_INT,
            Self::LongArray(_) => ARRAY | TAG_LONG,
            Self::FloatArray(_) => ARRAY | TAG_FLOAT,
            Self::DoubleArray(_) => ARRAY | TAG_DOUBLE,
            Self::StringArray(_) => ARRAY | TAG_STRING,
        }
    }

    /// Human readable type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Char(_) => "char",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::BoolArray(_) => "bool[]",
            Self::ByteArray(_) => "byte[]",
            Self::ShortArray(_) => "short[]",
            Self::CharArray(_) => "char[]",
            Self::IntArray(_) => "int[]",
            Self::LongArray(_) => "long[]",
            Self::FloatArray(_) => "float[]",
            Self::DoubleArray(_) => "double[]",
            Self::StringArray(_) => "string[]",
        }
    }

    /// True for the array variants
    pub fn is_array(&self) -> bool {
        self.tag() & ARRAY != 0
    }

    /// Tag-prefixed blob
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.tag());
        match self {
            Self::Bool(v) => buf.put_u8(*v as u8),
            Self::Byte(v) => buf.put_i8(*v),
            Self::Short(v) => buf.put_i16(*v),
            Self::Char(v) => buf.put_u32(*v as u32),
            Self::Int(v) => buf.put_i32(*v),
            Self::Long(v) => buf.put_i64(*v),
            Self::Float(v) => buf.put_u32(v.to_bits()),
            Self::Double(v) => buf.put_u64(v.to_bits()),
            Self::String(v) => buf.put_slice(v.as_bytes()),
            Self::Bytes(v) => buf.put_slice(v),
            Self::BoolArray(v) => v.iter().for_each(|b| buf.put_u8(*b as u8)),
            Self::ByteArray(v) => v.iter().for_each(|b| buf.put_i8(*b)),
            Self::ShortArray(v) => v.iter().for_each(|s| buf.put_i16(*s)),
            Self::CharArray(v) => v.iter().for_each(|c| buf.put_u32(*c as u32)),
            Self::IntArray(v) => v.iter().for_each(|i| buf.put_i32(*i)),
            Self::LongArray(v) => v.iter().for_each(|l| buf.put_i64(*l)),
            Self::FloatArray(v) => v.iter().for_each(|f| buf.put_u32(f.to_bits())),
            Self::DoubleArray(v) => v.iter().for_each(|d| buf.put_u64(d.to_bits())),
            Self::StringArray(v) => {
                buf.put_u32(length_u32(v.len())?);
                for s in v {
                    buf.put_u32(length_u32(s.len())?);
                    buf.put_slice(s.as_bytes());
                }
            }
        }
        Ok(buf.freeze())
    }

    /// Decode a blob produced by [`encode`](Self::encode)
    pub fn decode(blob: &[u8]) -> Result<Self> {
        let Some((&tag, mut body)) = blob.split_first() else {
            return Err(Error::format("empty value blob"));
        };

        let value = match tag {
            TAG_BOOL => Self::Bool(scalar(&mut body, 1, |b| b.get_u8())? != 0),
            TAG_BYTE => Self::Byte(scalar(&mut body, 1, |b| b.get_i8())?),
            TAG_SHORT => Self::Short(scalar(&mut body, 2, |b| b.get_i16())?),
            TAG_CHAR => Self::Char(to_char(scalar(&mut body, 4, |b| b.get_u32())?)?),
            TAG_INT => Self::Int(scalar(&mut body, 4, |b| b.get_i32())?),
            TAG_LONG => Self::Long(scalar(&mut body, 8, |b| b.get_i64())?),
            TAG_FLOAT => Self::Float(f32::from_bits(scalar(&mut body, 4, |b| b.get_u32())?)),
            TAG_DOUBLE => Self::Double(f64::from_bits(scalar(&mut body, 8, |b| b.get_u64())?)),
            TAG_STRING => Self::String(to_string(body.to_vec())?),
            TAG_BYTES => Self::Bytes(body.to_vec()),
            t if t == ARRAY | TAG_BOOL => Self::BoolArray(elements(body, 1, |b| b.get_u8() != 0)?),
            t if t == ARRAY | TAG_BYTE => Self::ByteArray(elements(body, 1, |b| b.get_i8())?),
            t if t == ARRAY | TAG_SHORT => Self::ShortArray(elements(body, 2, |b| b.get_i16())?),
            t if t == ARRAY | TAG_CHAR => Self::CharArray(
                elements(body, 4, |b| b.get_u32())?
                    .into_iter()
                    .map(to_char)
                    .collect::<Result<_>>()?,
            ),
            t if t == ARRAY | TAG_INT => Self::IntArray(elements(body, 4, |b| b.get_i32())?),
            t if t == ARRAY | TAG_LONG => Self::LongArray(elements(body, 8, |b| b.get_i64())?),
            t if t == ARRAY | TAG_FLOAT => {
                Self::FloatArray(elements(body, 4, |b| f32::from_bits(b.get_u32()))?)
            }
            t if t == ARRAY | TAG_DOUBLE => {
                Self::DoubleArray(elements(body, 8, |b| f64::from_bits(b.get_u64()))?)
            }
            t if t == ARRAY | TAG_STRING => Self::StringArray(string_array(body)?),
            other => return Err(Error::format(format!("unknown value tag 0x{:02x}", other))),
        };
        Ok(value)
    }
}

impl From<&str> for StorableValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StorableValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for StorableValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for StorableValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<bool> for StorableValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StorableValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

fn length_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::invalid_argument(format!("length {} exceeds u32", len)))
}

/// Exactly one fixed-width value
fn scalar<T>(body: &mut &[u8], width: usize, read: impl FnOnce(&mut &[u8]) -> T) -> Result<T> {
    if body.len() != width {
        return Err(Error::format(format!(
            "scalar of {} bytes, expected {}",
            body.len(),
            width
        )));
    }
    Ok(read(body))
}

fn elements<T>(mut body: &[u8], width: usize, read: impl Fn(&mut &[u8]) -> T) -> Result<Vec<T>> {
    if body.len() % width != 0 {
        return Err(Error::format(format!(
            "array body of {} bytes is not a multiple of {}",
            body.len(),
            width
        )));
    }
    let mut out = Vec::with_capacity(body.len() / width);
    while body.has_remaining() {
        out.push(read(&mut body));
    }
    Ok(out)
}

fn string_array(mut body: &[u8]) -> Result<Vec<String>> {
    let truncated = || Error::format("truncated string array");
    if body.remaining() < 4 {
        return Err(truncated());
    }
    let count = body.get_u32() as usize;
    let mut out = Vec::with_capacity(count.min(body.len() / 4));
    for _ in 0..count {
        if body.remaining() < 4 {
            return Err(truncated());
        }
        let len = body.get_u32() as usize;
        if body.remaining() < len {
            return Err(truncated());
        }
        out.push(to_string(body[..len].to_vec())?);
        body.advance(len);
    }
    if body.has_remaining() {
        return Err(Error::format("trailing bytes after string array"));
    }
    Ok(out)
}

fn to_char(code: u32) -> Result<char> {
    char::from_u32(code).ok_or_else(|| Error::format(format!("invalid char 0x{:x}", code)))
}

fn to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::format(format!("invalid utf-8: {}", e)))
}
