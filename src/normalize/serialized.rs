//! Parser for serialized object text.
//!
//! Windows agents render nested structures as `@{key=value; key=value}`
//! strings instead of JSON. This module turns that rendering back into
//! structured values. Parsing is total: malformed input is logged and
//! returned as the original string, never an error.

use serde_json::{Map, Number, Value};
use tracing::warn;

/// Returns true when a string carries the `@{...}` envelope and is worth
/// handing to [`parse_serialized`].
pub fn looks_serialized(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.starts_with("@{") && trimmed.ends_with('}')
}

/// Parses serialized object text into a JSON object.
///
/// Splits the interior on top-level semicolons (semicolons inside nested
/// `@{...}` values do not split), then each pair on its first `=`. Values
/// are coerced in order: empty string, boolean, integer, float, nested
/// object, array marker, and finally the raw string unchanged.
///
/// Input without the envelope comes back as a plain string value.
pub fn parse_serialized(input: &str) -> Value {
    let trimmed = input.trim();
    if !(trimmed.starts_with("@{") && trimmed.ends_with('}')) {
        if trimmed.starts_with("@{") {
            warn!("serialized text is missing its closing brace, keeping raw string");
        }
        return Value::String(input.to_string());
    }

    let interior = &trimmed[2..trimmed.len() - 1];
    let mut object = Map::new();
    for pair in split_pairs(interior) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((key, value)) => {
                object.insert(key.trim().to_string(), coerce_value(value.trim()));
            }
            None => {
                warn!(pair = %pair, "serialized pair has no '=' separator, skipping");
            }
        }
    }
    Value::Object(object)
}

/// Recursively applies [`parse_serialized`] to every string found in a
/// payload, so serialized text nested inside JSON arrays and objects is
/// expanded no matter how deep it sits.
pub fn expand_serialized(value: Value) -> Value {
    match value {
        Value::String(s) => {
            if looks_serialized(&s) {
                parse_serialized(&s)
            } else {
                Value::String(s)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(expand_serialized).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| (key, expand_serialized(inner)))
                .collect(),
        ),
        other => other,
    }
}

/// Splits the interior of an envelope on semicolons, tracking `@{`/`}`
/// nesting so nested objects stay intact. Only ASCII bytes are inspected,
/// which keeps byte indexing safe on multibyte input.
fn split_pairs(interior: &str) -> Vec<&str> {
    let bytes = interior.as_bytes();
    let mut pairs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'@' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if depth > 0 => depth -= 1,
            b';' if depth == 0 => {
                pairs.push(&interior[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    pairs.push(&interior[start..]);
    pairs
}

fn coerce_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Some(number) = numeric_value(raw) {
        return number;
    }
    if raw.starts_with("@{") {
        return parse_serialized(raw);
    }
    if is_array_marker(raw) {
        // The serializer emits only the element type name for arrays;
        // the contents are not recoverable.
        return Value::Array(Vec::new());
    }
    Value::String(raw.to_string())
}

/// Recognizes `System.Object[]` and friends, the runtime's rendering of
/// an array it could not serialize.
fn is_array_marker(raw: &str) -> bool {
    raw.starts_with("System.") && raw.ends_with("[]")
}

/// Coerces strictly numeric text. All digits becomes an integer, a
/// single digits-dot-digits form becomes a float. Anything looser
/// (versions like "1.2.3", identifiers with leading symbols) stays text.
fn numeric_value(raw: &str) -> Option<Value> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() {
        return None;
    }
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Some(Value::from(n));
        }
        return float_value(raw);
    }
    match digits.split_once('.') {
        Some((whole, frac))
            if !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit()) =>
        {
            float_value(raw)
        }
        _ => None,
    }
}

fn float_value(raw: &str) -> Option<Value> {
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
