//! Generic text rendering for handlers without a custom formatter.

use serde_json::Value;

/// Render a JSON value as indented `key: value` lines.
pub fn render_text(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("(none)".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(a) if a.is_empty() => Some("[]".to_string()),
        Value::Object(o) if o.is_empty() => Some("{}".to_string()),
        _ => None,
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    let pad = "  ".repeat(depth);
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, v) in map {
                match scalar(v) {
                    Some(s) => out.push_str(&format!("{}{}: {}\n", pad, key, s)),
                    None => {
                        out.push_str(&format!("{}{}:\n", pad, key));
                        write_value(out, v, depth + 1);
                    }
                }
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for item in items {
                match scalar(item) {
                    Some(s) => out.push_str(&format!("{}- {}\n", pad, s)),
                    None => {
                        out.push_str(&format!("{}-\n", pad));
                        write_value(out, item, depth + 1);
                    }
                }
            }
        }
        other => {
            if let Some(s) = scalar(other) {
                out.push_str(&format!("{}{}\n", pad, s));
            }
        }
    }
}
