//! Command descriptors and field schemas.
//!
//! Descriptors are what the `list` catalog command returns. Clients use the
//! field schema to compile `--key value` arguments into typed JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a scalar or array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// UTF-8 string.
    String,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Boolean.
    Bool,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "string" | "str" => Self::String,
            "int" | "integer" | "int32" => Self::Int,
            "long" | "int64" => Self::Long,
            "float" | "single" => Self::Float,
            "double" | "number" => Self::Double,
            "bool" | "boolean" => Self::Bool,
            _ => return None,
        })
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
        }
    }
}

/// Declared type of a request or response field.
///
/// Serialized as a type name such as `"int"` or `"string[]"`. Names that
/// aren't recognised are kept verbatim and treated like strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    /// A single value.
    Scalar(ScalarType),
    /// An ordered list of values.
    Array(ScalarType),
    /// Any other declared type (e.g. a nested object).
    Other(String),
}

impl FieldType {
    /// Shorthand for a string field.
    pub const STRING: FieldType = FieldType::Scalar(ScalarType::String);
    /// Shorthand for an int field.
    pub const INT: FieldType = FieldType::Scalar(ScalarType::Int);
    /// Shorthand for a bool field.
    pub const BOOL: FieldType = FieldType::Scalar(ScalarType::Bool);
    /// Shorthand for a string[] field.
    pub const STRING_ARRAY: FieldType = FieldType::Array(ScalarType::String);

    /// Whether values accumulate into a list.
    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    /// The scalar type values are coerced to.
    pub fn element(&self) -> ScalarType {
        match self {
            FieldType::Scalar(t) | FieldType::Array(t) => *t,
            FieldType::Other(_) => ScalarType::String,
        }
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        let trimmed = name.trim();
        if let Some(inner) = trimmed.strip_suffix("[]") {
            if let Some(t) = ScalarType::parse(inner) {
                return FieldType::Array(t);
            }
        } else if let Some(t) = ScalarType::parse(trimmed) {
            return FieldType::Scalar(t);
        }
        FieldType::Other(name)
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::from(name.to_string())
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(t) => f.write_str(t.as_str()),
            FieldType::Array(t) => write!(f, "{}[]", t.as_str()),
            FieldType::Other(name) => f.write_str(name),
        }
    }
}

/// One field of a request or response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Field name as it appears in the JSON body.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Default used by the handler when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl FieldDescriptor {
    /// Create a field without a default.
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            default_value: None,
        }
    }

    /// Attach a default value.
    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Description of one registered command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    /// Unique, case-sensitive routing key.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Registered by the dispatcher itself.
    #[serde(default)]
    pub built_in: bool,
    /// Module the command belongs to.
    #[serde(default)]
    pub module: String,
    /// Request schema.
    #[serde(default)]
    pub request_fields: Vec<FieldDescriptor>,
    /// Response schema.
    #[serde(default)]
    pub response_fields: Vec<FieldDescriptor>,
}

/// Body of the `list` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandCatalog {
    /// Every command in the active dispatch table.
    pub commands: Vec<CommandDescriptor>,
}

impl CommandCatalog {
    /// Find a command by exact name.
    pub fn find(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|c| c.name == name)
    }
}
