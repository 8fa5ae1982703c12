//! JSON codec using `serde_json`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// JSON codec for envelopes and command payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Encode a value to a compact JSON string.
    #[inline]
    pub fn encode_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode an optional command payload.
    ///
    /// Absent, empty or whitespace-only data decodes to `T::default()`.
    pub fn decode_or_default<T: DeserializeOwned + Default>(data: Option<&str>) -> Result<T> {
        match data {
            Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(text)?),
            _ => Ok(T::default()),
        }
    }
}
