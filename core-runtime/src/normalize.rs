//! Key Normalization
//!
//! The native SDK serializes payloads with snake_case keys; the core's typed
//! projections use camelCase. [`camelize_keys`] rewrites every key of a
//! JSON-like tree from snake_case to camelCase, recursing through objects
//! and arrays and passing all other values through unchanged.
//!
//! The rewrite mirrors the `/_([a-z])/` rule: an underscore immediately
//! followed by a lowercase ASCII letter is dropped and the letter
//! uppercased. Any other underscore (trailing, before a digit or an
//! already-uppercase letter) is preserved, which makes the transformation
//! idempotent.

use serde_json::{Map, Value};

/// Payloads come from a serialization boundary and are tree-shaped; the
/// depth guard only exists to bound pathological input.
const MAX_DEPTH: usize = 128;

/// Recursively rewrite every object key in `value` from snake_case to
/// camelCase.
///
/// Idempotent: normalizing an already-camelCase tree is a no-op.
///
/// # Example
///
/// ```rust
/// use core_runtime::normalize::camelize_keys;
/// use serde_json::json;
///
/// let normalized = camelize_keys(json!({ "sleep_index": 5 }));
/// assert_eq!(normalized, json!({ "sleepIndex": 5 }));
/// ```
pub fn camelize_keys(value: Value) -> Value {
    camelize_value(value, 0)
}

fn camelize_value(value: Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value;
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| camelize_value(item, depth + 1))
                .collect(),
        ),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                out.insert(camelize_key(&key), camelize_value(field, depth + 1));
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// Rewrite a single key: `_([a-z])` becomes the uppercased letter.
fn camelize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '_' {
            match chars.peek() {
                Some(next) if next.is_ascii_lowercase() => {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                }
                _ => out.push(ch),
            }
        } else {
            out.push(ch);
        }
    }
    out
}
