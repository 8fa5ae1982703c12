//! CLI-argument-to-JSON compiler.
//!
//! Turns `--key value` / `--flag` tokens into a JSON request body using a
//! command's declared request fields.
//!
//! # Example
//!
//! ```
//! use cmdwire::args::compile_args;
//! use cmdwire::schema::FieldDescriptor;
//!
//! let fields = vec![
//!     FieldDescriptor::new("count", "int"),
//!     FieldDescriptor::new("tags", "string[]"),
//! ];
//! let tokens = ["--count", "42", "--tags", "a", "--tags", "b"];
//! let json = compile_args(tokens, Some(&fields));
//! assert_eq!(json, serde_json::json!({"count": 42, "tags": ["a", "b"]}));
//! ```

use serde_json::{Map, Number, Value};

use crate::protocol::OutputFormat;
use crate::schema::{FieldDescriptor, ScalarType};

/// One `--key` and every value given for it, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgEntry {
    /// Key as first typed (without the leading `--`).
    pub key: String,
    /// Values in input order; `None` for a bare flag.
    pub values: Vec<Option<String>>,
}

impl ArgEntry {
    /// The value that wins for scalar fields.
    pub fn last(&self) -> Option<&str> {
        self.values.last().and_then(|v| v.as_deref())
    }
}

/// Collected `--key value` pairs, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    entries: Vec<(String, ArgEntry)>,
}

impl ParsedArgs {
    /// Look up a key, case-insensitive.
    pub fn get(&self, key: &str) -> Option<&ArgEntry> {
        let lower = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == lower)
            .map(|(_, e)| e)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys were given.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &ArgEntry> {
        self.entries.iter().map(|(_, e)| e)
    }

    fn record(&mut self, key: &str, value: Option<String>) {
        let lower = key.to_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == lower) {
            Some((_, entry)) => entry.values.push(value),
            None => self.entries.push((
                lower,
                ArgEntry {
                    key: key.to_string(),
                    values: vec![value],
                },
            )),
        }
    }
}

fn flag_key(token: &str) -> Option<&str> {
    token.strip_prefix("--").filter(|k| !k.is_empty())
}

/// Scan tokens left to right and collect `--key value` pairs.
///
/// A value always belongs to the immediately preceding `--key`. A key
/// followed by another flag (or by nothing) is recorded with a `None`
/// value. Tokens that are neither flags nor flag values are ignored.
pub fn parse_args<I, S>(tokens: I) -> ParsedArgs
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let tokens: Vec<String> = tokens
        .into_iter()
        .map(|t| t.as_ref().to_string())
        .collect();
    let mut parsed = ParsedArgs::default();

    let mut i = 0;
    while i < tokens.len() {
        let Some(key) = flag_key(&tokens[i]) else {
            i += 1;
            continue;
        };

        match tokens.get(i + 1).map(String::as_str) {
            Some(next) if !next.starts_with("--") => {
                parsed.record(key, Some(next.to_string()));
                i += 2;
            }
            _ => {
                parsed.record(key, None);
                i += 1;
            }
        }
    }

    parsed
}

/// Coerce one raw value to a JSON value of the given type.
///
/// A bare flag is `true` for bool fields and `null` otherwise. Values that
/// don't parse as the declared type fall back to a JSON string.
pub fn coerce_value(raw: Option<&str>, ty: ScalarType) -> Value {
    let Some(raw) = raw else {
        return match ty {
            ScalarType::Bool => Value::Bool(true),
            _ => Value::Null,
        };
    };

    let coerced = match ty {
        ScalarType::String => None,
        ScalarType::Int => raw.parse::<i32>().ok().map(Value::from),
        ScalarType::Long => raw.parse::<i64>().ok().map(Value::from),
        ScalarType::Float | ScalarType::Double => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        ScalarType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
    };

    coerced.unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Build the JSON request body from parsed arguments.
///
/// Schema fields take their declared casing and type: array fields get
/// every value in order, scalar fields get the last one. Keys with no
/// matching field are still emitted under the input's casing, as the
/// string they were given.
///
/// A bare flag with no matching field is the one exception to the string
/// rule: it has no text to emit, so it becomes `true`, the same value a
/// declared `bool` field gets for a bare flag.
pub fn build_json(parsed: &ParsedArgs, fields: Option<&[FieldDescriptor]>) -> Value {
    let fields = fields.unwrap_or_default();
    let mut object = Map::new();
    let mut consumed = Vec::new();

    for field in fields {
        let Some(entry) = parsed.get(&field.name) else {
            continue;
        };
        consumed.push(field.name.to_lowercase());

        let element = field.field_type.element();
        let value = if field.field_type.is_array() {
            Value::Array(
                entry
                    .values
                    .iter()
                    .map(|v| coerce_value(v.as_deref(), element))
                    .collect(),
            )
        } else {
            coerce_value(entry.last(), element)
        };
        object.insert(field.name.clone(), value);
    }

    for entry in parsed.iter() {
        if consumed.contains(&entry.key.to_lowercase()) {
            continue;
        }
        let value = match entry.last() {
            Some(v) => Value::String(v.to_string()),
            None => Value::Bool(true),
        };
        object.insert(entry.key.clone(), value);
    }

    Value::Object(object)
}

/// Parse tokens and build the JSON body in one step.
pub fn compile_args<I, S>(tokens: I, fields: Option<&[FieldDescriptor]>) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    build_json(&parse_args(tokens), fields)
}

/// Remove a `--format text|json` modifier from the tokens.
///
/// Unrecognised format values are left in place as ordinary arguments.
/// When the command declares its own `format` request field the tokens
/// are returned untouched, so `--format` reaches the command.
pub fn extract_format(
    tokens: Vec<String>,
    fields: Option<&[FieldDescriptor]>,
) -> (Vec<String>, Option<OutputFormat>) {
    let declares_format = fields
        .unwrap_or_default()
        .iter()
        .any(|f| f.name.eq_ignore_ascii_case("format"));
    if declares_format {
        return (tokens, None);
    }

    let mut rest = Vec::with_capacity(tokens.len());
    let mut format = None;

    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if token.eq_ignore_ascii_case("--format") {
            if let Some(parsed) = iter.peek().and_then(|v| OutputFormat::parse(v)) {
                format = Some(parsed);
                iter.next();
                continue;
            }
        }
        rest.push(token);
    }

    (rest, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(defs: &[(&str, &str)]) -> Vec<FieldDescriptor> {
        defs.iter()
            .map(|(n, t)| FieldDescriptor::new(*n, *t))
            .collect()
    }

    #[test]
    fn test_flag_without_value_is_none() {
        let parsed = parse_args(["--force", "--path", "Assets/a.prefab", "--dry"]);
        assert_eq!(parsed.get("force").unwrap().values, vec![None]);
        assert_eq!(
            parsed.get("path").unwrap().values,
            vec![Some("Assets/a.prefab".to_string())]
        );
        assert_eq!(parsed.get("dry").unwrap().values, vec![None]);
    }

    #[test]
    fn test_positional_tokens_ignored() {
        let parsed = parse_args(["Scene.Open", "extra", "--name", "Main"]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("name").unwrap().last(), Some("Main"));
    }

    #[test]
    fn test_single_dash_values_are_consumed() {
        let parsed = parse_args(["--offset", "-5"]);
        assert_eq!(parsed.get("offset").unwrap().last(), Some("-5"));
    }

    #[test]
    fn test_bare_double_dash_is_not_a_key() {
        let parsed = parse_args(["--", "value"]);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_repeated_keys_accumulate_case_insensitively() {
        let parsed = parse_args(["--Tag", "a", "--tag", "b", "--TAG", "c"]);
        let entry = parsed.get("tag").unwrap();
        assert_eq!(entry.key, "Tag");
        assert_eq!(
            entry.values,
            vec![Some("a".into()), Some("b".into()), Some("c".into())]
        );
    }

    #[test]
    fn test_int_field_becomes_number() {
        let schema = fields(&[("count", "int")]);
        let json = compile_args(["--count", "42"], Some(&schema));
        assert_eq!(json, json!({"count": 42}));
        assert!(json["count"].is_number());
    }

    #[test]
    fn test_unparsable_int_falls_back_to_string() {
        let schema = fields(&[("count", "int")]);
        let json = compile_args(["--count", "abc"], Some(&schema));
        assert_eq!(json, json!({"count": "abc"}));
    }

    #[test]
    fn test_int_overflow_falls_back_but_long_accepts() {
        let schema = fields(&[("small", "int"), ("big", "long")]);
        let json = compile_args(
            ["--small", "5000000000", "--big", "5000000000"],
            Some(&schema),
        );
        assert_eq!(json, json!({"small": "5000000000", "big": 5000000000i64}));
    }

    #[test]
    fn test_scalar_takes_last_value() {
        let schema = fields(&[("name", "string")]);
        let json = compile_args(["--name", "first", "--name", "second"], Some(&schema));
        assert_eq!(json, json!({"name": "second"}));
    }

    #[test]
    fn test_array_takes_all_values_in_order() {
        let schema = fields(&[("ids", "int[]")]);
        let json = compile_args(["--ids", "3", "--ids", "1", "--ids", "x"], Some(&schema));
        assert_eq!(json, json!({"ids": [3, 1, "x"]}));
    }

    #[test]
    fn test_bool_flag_presence_implies_true() {
        let schema = fields(&[("force", "bool"), ("quiet", "bool")]);
        let json = compile_args(["--force", "--quiet", "FALSE"], Some(&schema));
        assert_eq!(json, json!({"force": true, "quiet": false}));
    }

    #[test]
    fn test_bare_flag_on_string_field_is_null() {
        let schema = fields(&[("name", "string")]);
        let json = compile_args(["--name"], Some(&schema));
        assert_eq!(json, json!({"name": null}));
    }

    #[test]
    fn test_float_field() {
        let schema = fields(&[("scale", "float")]);
        assert_eq!(
            compile_args(["--scale", "1.5"], Some(&schema)),
            json!({"scale": 1.5})
        );
        assert_eq!(
            compile_args(["--scale", "NaN"], Some(&schema)),
            json!({"scale": "NaN"})
        );
    }

    #[test]
    fn test_schema_casing_wins_when_matched() {
        let schema = fields(&[("assetPath", "string")]);
        let json = compile_args(["--ASSETPATH", "Assets/x"], Some(&schema));
        assert_eq!(json, json!({"assetPath": "Assets/x"}));
    }

    #[test]
    fn test_unknown_keys_keep_input_casing_as_strings() {
        let schema = fields(&[("count", "int")]);
        let json = compile_args(["--Extra", "7", "--count", "1", "--Verbose"], Some(&schema));
        assert_eq!(json, json!({"count": 1, "Extra": "7", "Verbose": true}));
    }

    #[test]
    fn test_no_schema_no_input_is_empty_object() {
        let json = compile_args(Vec::<String>::new(), None);
        assert_eq!(json, json!({}));
    }

    #[test]
    fn test_fields_absent_from_input_are_omitted() {
        let schema = fields(&[("count", "int"), ("name", "string")]);
        let json = compile_args(["--name", "x"], Some(&schema));
        assert_eq!(json, json!({"name": "x"}));
    }

    #[test]
    fn test_extract_format() {
        let tokens = vec!["--path".into(), "a".into(), "--format".into(), "text".into()];
        let (rest, format) = extract_format(tokens, None);
        assert_eq!(rest, vec!["--path".to_string(), "a".to_string()]);
        assert_eq!(format, Some(OutputFormat::Text));

        let tokens = vec!["--format".into(), "yaml".into()];
        let (rest, format) = extract_format(tokens, None);
        assert_eq!(rest.len(), 2);
        assert_eq!(format, None);
    }

    #[test]
    fn test_declared_format_field_keeps_its_argument() {
        let defs = fields(&[("path", "string"), ("Format", "string")]);
        let tokens: Vec<String> = ["--path", "a", "--format", "text"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let (rest, format) = extract_format(tokens.clone(), Some(defs.as_slice()));
        assert_eq!(rest, tokens);
        assert_eq!(format, None);
        assert_eq!(
            compile_args(&rest, Some(defs.as_slice())),
            json!({"path": "a", "Format": "text"})
        );

        let others = fields(&[("path", "string")]);
        let (rest, format) = extract_format(tokens, Some(others.as_slice()));
        assert_eq!(rest.len(), 2);
        assert_eq!(format, Some(OutputFormat::Text));
    }

    #[test]
    fn test_bare_unknown_flag_is_true_not_a_string() {
        let defs = fields(&[("count", "int")]);
        let json = build_json(
            &parse_args(["--count", "2", "--dry-run", "--label", "x"]),
            Some(defs.as_slice()),
        );
        assert_eq!(json, json!({"count": 2, "dry-run": true, "label": "x"}));
    }
}
