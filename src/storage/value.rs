//! Stored Values
//!
//! A cache entry holds either a scalar or an opaque blob. Scalars keep
//! their type on disk so counters can be incremented in place; anything
//! structured is serialized to JSON before it reaches the envelope.

use crate::error::{CacheError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value as stored inside an entry envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer family
    Int(i64),
    /// Unsigned integer family
    Uint(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Text
    Str(String),
    /// Pre-serialized structured data (JSON)
    Blob(Bytes),
}

impl Value {
    /// Serializes a structured value into a JSON blob.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let data = serde_json::to_vec(value)
            .map_err(|e| CacheError::InvalidArgument(format!("cannot serialize value: {e}")))?;
        Ok(Value::Blob(Bytes::from(data)))
    }

    /// Returns true for every variant except [`Value::Blob`].
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Blob(_))
    }

    /// Renders the value as text.
    ///
    /// Floats use the shortest decimal form that round-trips, never an
    /// exponent or a fixed number of digits. Blobs are decoded lossily.
    pub fn to_text(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Uint(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Str(v) => v.clone(),
            Value::Blob(v) => String::from_utf8_lossy(v).into_owned(),
        }
    }

    /// Converts the stored form into what `get` hands back to callers.
    ///
    /// Blobs are parsed back into JSON; a blob that is not valid JSON comes
    /// back as a JSON string of its text. Scalars come back as text.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Blob(data) => serde_json::from_slice(&data).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&data).into_owned())
            }),
            scalar => serde_json::Value::String(scalar.to_text()),
        }
    }

    /// Adds one to an integer value.
    pub(crate) fn incremented(&self, key: &str) -> Result<Value> {
        match self {
            Value::Int(v) => v
                .checked_add(1)
                .map(Value::Int)
                .ok_or_else(|| CacheError::Overflow(key.to_string())),
            Value::Uint(v) => v
                .checked_add(1)
                .map(Value::Uint)
                .ok_or_else(|| CacheError::Overflow(key.to_string())),
            _ => Err(CacheError::TypeMismatch(key.to_string())),
        }
    }

    /// Subtracts one from an integer value.
    ///
    /// Unsigned values refuse to go below zero.
    pub(crate) fn decremented(&self, key: &str) -> Result<Value> {
        match self {
            Value::Int(v) => v
                .checked_sub(1)
                .map(Value::Int)
                .ok_or_else(|| CacheError::Overflow(key.to_string())),
            Value::Uint(0) => Err(CacheError::Underflow(key.to_string())),
            Value::Uint(v) => Ok(Value::Uint(v - 1)),
            _ => Err(CacheError::TypeMismatch(key.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

macro_rules! value_from {
    ($variant:ident as $target:ty: $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v as $target)
                }
            }
        )*
    };
}

value_from!(Int as i64: i8, i16, i32, i64, isize);
value_from!(Uint as u64: u8, u16, u32, u64, usize);
value_from!(Float as f64: f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Blob(v)
    }
}
