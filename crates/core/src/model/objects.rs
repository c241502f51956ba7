//! PDF object types.

use crate::codec::FilterChain;
use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use std::fmt;

/// Dictionary keys are stored without the leading slash.
pub type Dictionary = IndexMap<String, PdfValue>;

/// Identifier of an indirect object: (object number, generation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    /// Name object, stored without the leading slash
    Name(String),
    /// String (byte array); literal and hex strings are not distinguished
    String(Vec<u8>),
    Array(Vec<Self>),
    Dict(Dictionary),
    /// Stream (dictionary + encoded payload)
    Stream(Box<PdfStream>),
    /// Indirect object reference
    Ref(ObjectId),
}

impl PdfValue {
    pub fn name(name: &str) -> Self {
        Self::Name(name.to_string())
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(self.type_error("bool")),
        }
    }

    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(self.type_error("int")),
        }
    }

    pub const fn as_real(&self) -> Result<f64> {
        match self {
            Self::Real(n) => Ok(*n),
            _ => Err(self.type_error("real")),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(self.type_error("number")),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(self.type_error("name")),
        }
    }

    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(self.type_error("array")),
        }
    }

    /// Get the dictionary of a dict or of a stream.
    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.dict),
            _ => Err(self.type_error("dict")),
        }
    }

    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(self.type_error("stream")),
        }
    }

    pub const fn as_reference(&self) -> Result<ObjectId> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(self.type_error("ref")),
        }
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }

    const fn type_error(&self, expected: &'static str) -> PdfError {
        PdfError::TypeError {
            expected,
            got: self.type_name(),
        }
    }

    /// Call `f` for every indirect reference contained by value.
    pub fn for_each_ref(&self, f: &mut impl FnMut(ObjectId)) {
        match self {
            Self::Ref(id) => f(*id),
            Self::Array(arr) => arr.iter().for_each(|v| v.for_each_ref(f)),
            Self::Dict(d) => d.values().for_each(|v| v.for_each_ref(f)),
            Self::Stream(s) => s.dict.values().for_each(|v| v.for_each_ref(f)),
            _ => {}
        }
    }

    /// Rewrite every indirect reference contained by value.
    pub fn map_refs(&mut self, f: &mut impl FnMut(ObjectId) -> ObjectId) {
        match self {
            Self::Ref(id) => *id = f(*id),
            Self::Array(arr) => arr.iter_mut().for_each(|v| v.map_refs(f)),
            Self::Dict(d) => d.values_mut().for_each(|v| v.map_refs(f)),
            Self::Stream(s) => s.dict.values_mut().for_each(|v| v.map_refs(f)),
            _ => {}
        }
    }
}

impl From<ObjectId> for PdfValue {
    fn from(id: ObjectId) -> Self {
        Self::Ref(id)
    }
}

impl From<Dictionary> for PdfValue {
    fn from(dict: Dictionary) -> Self {
        Self::Dict(dict)
    }
}

impl From<PdfStream> for PdfValue {
    fn from(stream: PdfStream) -> Self {
        Self::Stream(Box::new(stream))
    }
}

/// PDF stream: dictionary attributes plus the payload as stored in the file
/// (still encoded by the `/Filter` chain).
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: Dictionary,
    raw: Bytes,
}

impl PdfStream {
    pub fn new(dict: Dictionary, raw: impl Into<Bytes>) -> Self {
        Self {
            dict,
            raw: raw.into(),
        }
    }

    /// Encoded payload.
    pub fn raw(&self) -> &[u8] {
        self.raw.as_ref()
    }

    pub fn raw_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    pub fn set_raw(&mut self, raw: impl Into<Bytes>) {
        self.raw = raw.into();
    }

    pub fn get(&self, name: &str) -> Option<&PdfValue> {
        self.dict.get(name)
    }

    /// Get attribute, trying multiple names.
    pub fn get_any(&self, names: &[&str]) -> Option<&PdfValue> {
        names.iter().find_map(|name| self.dict.get(*name))
    }

    /// Value of `/Type`, if it is a name.
    pub fn type_name(&self) -> Option<&str> {
        self.dict.get("Type").and_then(|t| t.as_name().ok())
    }

    pub fn filter_chain(&self) -> FilterChain {
        FilterChain::from_dict(&self.dict)
    }

    /// Payload with every filter removed.
    pub fn decode(&self) -> Result<Vec<u8>> {
        self.filter_chain().decode(&self.raw)
    }
}
