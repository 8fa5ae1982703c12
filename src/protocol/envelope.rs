//! Request and response envelopes.
//!
//! Envelopes are flat JSON objects. The `data` field is itself a JSON
//! document encoded as a string (or rendered text), never an embedded
//! object, so the envelope is escaped exactly once.

use serde::{Deserialize, Serialize};

use super::Frame;
use crate::codec::JsonCodec;
use crate::error::Result;

/// Version string reported in every response.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Requested rendering of the response `data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `data` is a JSON document.
    #[default]
    Json,
    /// `data` is human-readable text.
    Text,
}

impl OutputFormat {
    /// Parse a `--format` value, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// A command request sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Command name (routing key).
    pub command: String,
    /// JSON-encoded request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Response rendering.
    #[serde(default)]
    pub format: OutputFormat,
    /// Client working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl RequestEnvelope {
    /// Request with no payload.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Attach a JSON value as `data`.
    pub fn with_json(mut self, value: &serde_json::Value) -> Result<Self> {
        self.data = Some(JsonCodec::encode_string(value)?);
        Ok(self)
    }

    /// Attach pre-encoded JSON as `data`.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the response format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the client working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Serialize to a frame body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        JsonCodec::encode(self)
    }

    /// Parse from a frame body.
    pub fn decode(frame: &Frame) -> Result<Self> {
        JsonCodec::decode(frame.body())
    }
}

/// A command response sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Whether the command succeeded.
    pub success: bool,
    /// Human-readable outcome; the failure reason when `success` is false.
    #[serde(default)]
    pub message: String,
    /// JSON-encoded response body, or rendered text.
    #[serde(default)]
    pub data: String,
    /// Rendering of `data`.
    #[serde(default)]
    pub format: OutputFormat,
    /// Version of the responding server.
    #[serde(default)]
    pub server_version: String,
    /// Set when client and server protocol versions differ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_warning: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response carrying `data`.
    pub fn ok(data: String, format: OutputFormat) -> Self {
        Self {
            success: true,
            message: String::new(),
            data,
            format,
            server_version: SERVER_VERSION.to_string(),
            version_warning: None,
        }
    }

    /// Failed response without payload.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: String::new(),
            format: OutputFormat::Json,
            server_version: SERVER_VERSION.to_string(),
            version_warning: None,
        }
    }

    /// Failed response that still carries a (partial) payload.
    pub fn failure_with_data(message: impl Into<String>, data: String, format: OutputFormat) -> Self {
        Self {
            data,
            format,
            ..Self::failure(message)
        }
    }

    /// Attach a version warning.
    pub fn with_version_warning(mut self, warning: Option<String>) -> Self {
        self.version_warning = warning;
        self
    }

    /// Parse `data` as JSON. Empty data yields `null`.
    pub fn data_json(&self) -> Result<serde_json::Value> {
        if self.data.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        JsonCodec::decode(self.data.as_bytes())
    }

    /// Serialize to a frame body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        JsonCodec::encode(self)
    }

    /// Parse from a frame body.
    pub fn decode(frame: &Frame) -> Result<Self> {
        JsonCodec::decode(frame.body())
    }
}
