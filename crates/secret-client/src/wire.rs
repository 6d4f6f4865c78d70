//! The variant-typed values moved by a [`Transport`](crate::Transport).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The object path a service returns to mean "no object".
pub const NO_OBJECT: &str = "/";

/// A single bus value.
///
/// The accessors look through any number of [`WireValue::Variant`] wrappers, since the bus
/// hands out boxed values for method outputs and properties alike.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Str(String),
    ObjectPath(String),
    Bytes(Vec<u8>),
    Array(Vec<WireValue>),
    Struct(Vec<WireValue>),
    Dict(HashMap<String, WireValue>),
    Variant(Box<WireValue>),
}

impl WireValue {
    /// Box a value into a variant.
    pub fn variant(value: impl Into<WireValue>) -> Self {
        WireValue::Variant(Box::new(value.into()))
    }

    /// Build an object path value.
    pub fn object_path(path: impl Into<String>) -> Self {
        WireValue::ObjectPath(path.into())
    }

    /// The innermost value, with every variant wrapper removed.
    pub fn unboxed(&self) -> &WireValue {
        let mut value = self;
        while let WireValue::Variant(inner) = value {
            value = inner.as_ref();
        }
        value
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> Option<&str> {
        match self.unboxed() {
            WireValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_object_path(&self) -> Option<&str> {
        match self.unboxed() {
            WireValue::ObjectPath(path) => Some(path),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.unboxed() {
            WireValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match self.unboxed() {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unsigned integers of either width.
    pub fn as_u64(&self) -> Option<u64> {
        match self.unboxed() {
            WireValue::U64(n) => Some(*n),
            WireValue::U32(n) => Some(u64::from(*n)),
            _ => None,
        }
    }

    /// Fields of a struct value.
    pub fn as_struct(&self) -> Option<&[WireValue]> {
        match self.unboxed() {
            WireValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_dict(&self) -> Option<&HashMap<String, WireValue>> {
        match self.unboxed() {
            WireValue::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::Str(value.to_owned())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::Str(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<u64> for WireValue {
    fn from(value: u64) -> Self {
        WireValue::U64(value)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(value: Vec<u8>) -> Self {
        WireValue::Bytes(value)
    }
}
