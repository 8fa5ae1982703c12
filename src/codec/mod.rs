//! Codec module - serialization for envelopes and command payloads.
//!
//! Everything on the wire is JSON:
//!
//! - envelopes are JSON objects inside a frame body
//! - a command's `data` is a JSON document carried as a string
//!
//! [`JsonCodec`] is a marker struct with static methods, so the codec is
//! chosen at compile time.
//!
//! # Example
//!
//! ```
//! use cmdwire::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode_string(&vec![1, 2, 3]).unwrap();
//! assert_eq!(encoded, "[1,2,3]");
//! let decoded: Vec<i32> = JsonCodec::decode(encoded.as_bytes()).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

mod json;

pub use json::JsonCodec;
