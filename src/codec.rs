//! Pluggable value encodings.
//!
//! Typed values are converted to a [`serde_json::Value`] first and the codec
//! turns that into the string handed to the store. Decoding runs the other way.
//! A client uses exactly one codec for all of its reads and writes.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt::Debug;

use crate::error::CacheError;

/// Encoder/decoder pair used by a [`Client`](crate::Client).
pub trait Codec: Send + Sync + Debug {
    /// A name for logs.
    fn name(&self) -> &'static str;

    /// Turn a value into the string stored in the cache.
    fn encode(&self, value: &Value) -> Result<String, CacheError>;

    /// Turn a stored string back into a value.
    fn decode(&self, raw: &str) -> Result<Value, CacheError>;

    /// Report a decoded value that does not fit the caller's type.
    fn mismatch(&self, err: serde_json::Error) -> CacheError {
        CacheError::Serialization(format!("Deserialization failed: {}", err))
    }

    /// A decoded value that every legal target type must accept.
    ///
    /// `None` means any type may be decoded into.
    fn probe(&self) -> Option<Value> {
        None
    }
}

/// Structured text encoding backed by `serde_json`. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<String, CacheError> {
        serde_json::to_string(value)
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))
    }

    fn decode(&self, raw: &str) -> Result<Value, CacheError> {
        serde_json::from_str(raw)
            .map_err(|e| CacheError::Serialization(format!("Deserialization failed: {}", e)))
    }
}

/// Passthrough encoding for values that already are strings.
///
/// Non-string values are refused with [`CacheError::Type`]. A missing value
/// (`None`/`null`) is stored as the empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn name(&self) -> &'static str {
        "string"
    }

    fn encode(&self, value: &Value) -> Result<String, CacheError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => Err(CacheError::Type(format!(
                "string codec needs a string value, got {}",
                kind(other)
            ))),
        }
    }

    fn decode(&self, raw: &str) -> Result<Value, CacheError> {
        Ok(Value::String(raw.to_string()))
    }

    fn mismatch(&self, err: serde_json::Error) -> CacheError {
        CacheError::Type(format!("string codec needs a string target: {}", err))
    }

    fn probe(&self) -> Option<Value> {
        Some(Value::String(String::new()))
    }
}

/// Encode a typed value with the given codec.
pub fn encode_with<T>(codec: &dyn Codec, value: &T) -> Result<String, CacheError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)
        .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))?;
    codec.encode(&value)
}

/// Decode a stored string into `T` with the given codec.
pub fn decode_with<T>(codec: &dyn Codec, raw: &str) -> Result<T, CacheError>
where
    T: DeserializeOwned,
{
    let value = codec.decode(raw)?;
    serde_json::from_value(value).map_err(|e| codec.mismatch(e))
}

/// Decode a stored string into an existing `out`.
///
/// A stored empty value (`null`) that `T` cannot represent is a hit that
/// leaves `out` as it was.
pub fn decode_into<T>(codec: &dyn Codec, raw: &str, out: &mut T) -> Result<(), CacheError>
where
    T: DeserializeOwned,
{
    let value = codec.decode(raw)?;
    if value.is_null() {
        if let Ok(decoded) = serde_json::from_value(Value::Null) {
            *out = decoded;
        }
        return Ok(());
    }
    *out = serde_json::from_value(value).map_err(|e| codec.mismatch(e))?;
    Ok(())
}

/// Check that `T` can receive values produced by the codec.
pub fn check_target<T>(codec: &dyn Codec) -> Result<(), CacheError>
where
    T: DeserializeOwned,
{
    let Some(sample) = codec.probe() else {
        return Ok(());
    };
    serde_json::from_value::<T>(sample).map(|_| ()).map_err(|e| {
        CacheError::Type(format!(
            "{} codec cannot decode into {}: {}",
            codec.name(),
            std::any::type_name::<T>(),
            e
        ))
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
