//! Key descriptors
//!
//! A logical cache key is either a plain string or a structured value
//! (usually an object of scalar fields). Identity is decided by the
//! canonical encoding, never by field insertion order.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// A logical identifier for a cached value
#[derive(Debug, Clone, PartialEq)]
pub enum KeyDescriptor {
    /// A plain string key
    Text(String),

    /// A structured key, typically `{"owner": "x", "method": "repos.get"}`
    Structured(Value),
}

impl KeyDescriptor {
    /// Build a structured descriptor from field/value pairs
    pub fn fields<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: serde_json::Map<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        KeyDescriptor::Structured(Value::Object(map))
    }

    /// Interpret a command-line argument: JSON objects and arrays are
    /// structured, anything else is a plain string
    pub fn parse_arg(arg: &str) -> Self {
        match serde_json::from_str::<Value>(arg) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => KeyDescriptor::Structured(value),
            _ => KeyDescriptor::Text(arg.to_string()),
        }
    }

    /// Stable serialization, independent of field order
    ///
    /// Objects are written with their fields sorted by name; strings are
    /// JSON-escaped so a text key never collides with a structured one.
    pub fn canonicalize(&self) -> String {
        let mut out = String::new();
        match self {
            KeyDescriptor::Text(text) => write_string(text, &mut out),
            KeyDescriptor::Structured(value) => write_canonical(value, &mut out),
        }
        out
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(name, out);
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // Value::String(..).to_string() cannot fail and handles escaping
    out.push_str(&Value::String(s.to_string()).to_string());
}

impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDescriptor::Text(text) => f.write_str(text),
            KeyDescriptor::Structured(_) => f.write_str(&self.canonicalize()),
        }
    }
}

impl From<&str> for KeyDescriptor {
    fn from(text: &str) -> Self {
        KeyDescriptor::Text(text.to_string())
    }
}

impl From<String> for KeyDescriptor {
    fn from(text: String) -> Self {
        KeyDescriptor::Text(text)
    }
}

impl From<&String> for KeyDescriptor {
    fn from(text: &String) -> Self {
        KeyDescriptor::Text(text.clone())
    }
}

impl From<Value> for KeyDescriptor {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => KeyDescriptor::Text(text),
            other => KeyDescriptor::Structured(other),
        }
    }
}

impl From<BTreeMap<String, Value>> for KeyDescriptor {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        KeyDescriptor::fields(fields)
    }
}
