//! Schema normalization: shaping parsed JSON toward an expected layout.
//!
//! This pass never fails. Missing expected fields are filled with
//! type-appropriate defaults and safe type mismatches are coerced, each
//! with an explicit warning so callers (and tests) can see exactly what
//! was changed. Trading strict correctness for robustness is appropriate
//! here: upstream text is unpredictable, not attacker-controlled.

use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

/// Expected JSON type for a normalized field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    /// Default value inserted for a missing field of this kind.
    fn default_value(&self) -> JsonValue {
        match self {
            Self::String => json!(""),
            Self::Number => json!(0),
            Self::Boolean => json!(false),
            Self::Array => json!([]),
            Self::Object => json!({}),
        }
    }

    fn matches(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{}", s)
    }
}

/// One top-level field the caller expects in the parsed result.
#[derive(Debug, Clone)]
pub struct ExpectedField {
    pub name: String,
    pub kind: FieldKind,
}

impl ExpectedField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Normalize `value` against `expected`, returning the shaped value and
/// the list of coercions applied.
pub fn normalize(value: JsonValue, expected: &[ExpectedField]) -> (JsonValue, Vec<String>) {
    let mut warnings = Vec::new();

    let mut map = match value {
        JsonValue::Object(map) => map,
        other => {
            warnings.push(format!(
                "root is {}, not an object; field normalization skipped",
                type_name(&other)
            ));
            return (other, warnings);
        }
    };

    for field in expected {
        normalize_field(&mut map, field, &mut warnings);
    }

    if !warnings.is_empty() {
        debug!(coercions = warnings.len(), "Schema normalization applied");
    }

    (JsonValue::Object(map), warnings)
}

fn normalize_field(map: &mut Map<String, JsonValue>, field: &ExpectedField, warnings: &mut Vec<String>) {
    let current = match map.get(&field.name) {
        None | Some(JsonValue::Null) => {
            map.insert(field.name.clone(), field.kind.default_value());
            warnings.push(format!(
                "filled missing field `{}` with default {}",
                field.name, field.kind
            ));
            return;
        }
        Some(v) => v,
    };

    if field.kind.matches(current) {
        return;
    }

    let from = type_name(current);
    let coerced = coerce(current, field.kind);
    match coerced {
        Some(new_value) => {
            warnings.push(format!(
                "coerced field `{}` from {} to {}",
                field.name, from, field.kind
            ));
            map.insert(field.name.clone(), new_value);
        }
        None => {
            warnings.push(format!(
                "replaced field `{}` ({}) with default {}; no safe coercion",
                field.name, from, field.kind
            ));
            map.insert(field.name.clone(), field.kind.default_value());
        }
    }
}

/// Safe coercions only: stringify scalars, wrap a value as a one-element
/// array, parse numeric/boolean strings. Everything else returns `None`
/// and the caller falls back to the default.
fn coerce(value: &JsonValue, kind: FieldKind) -> Option<JsonValue> {
    match kind {
        FieldKind::String => match value {
            JsonValue::Number(n) => Some(json!(n.to_string())),
            JsonValue::Bool(b) => Some(json!(b.to_string())),
            _ => None,
        },
        FieldKind::Array => Some(json!([value.clone()])),
        FieldKind::Number => value
            .as_str()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(|f| serde_json::Number::from_f64(f).map(JsonValue::Number)),
        FieldKind::Boolean => match value.as_str().map(str::trim) {
            Some("true") => Some(json!(true)),
            Some("false") => Some(json!(false)),
            _ => None,
        },
        FieldKind::Object => None,
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
