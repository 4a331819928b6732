//! Deterministic serialization of JSON-shaped records.
//!
//! The signing service signs these exact bytes, and the license-consuming
//! clients rebuild them to verify, so the rendering must be byte-identical
//! for semantically identical records regardless of how they were
//! constructed: object keys sorted at every nesting level, arrays in
//! order, compact separators, one representation per string and number.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("non-finite number cannot be canonicalized")]
    NonFiniteNumber,

    #[error("object keys collide after NFC normalization: {key:?}")]
    KeyCollision { key: String },

    #[error("value is not representable as JSON: {0}")]
    NotJson(String),
}

/// Canonical bytes of any serializable record.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(value).map_err(|e| CanonicalError::NotJson(e.to_string()))?;
    canonicalize_value(&value)
}

/// Canonical bytes of an already-built JSON value.
pub fn canonicalize_value(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut out = Vec::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            // serde_json::Number cannot hold a non-finite f64 today; the
            // check guards against representations (e.g. the
            // arbitrary-precision feature) where it could.
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CanonicalError::NonFiniteNumber);
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(String, &Value)> = map
                .iter()
                .map(|(key, value)| (key.nfc().collect::<String>(), value))
                .collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            for pair in entries.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(CanonicalError::KeyCollision {
                        key: pair[0].0.clone(),
                    });
                }
            }
            out.push(b'{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_value(out, value)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

/// JSON string escaping, matching serde_json's default output: the two
/// mandatory escapes, short forms for the common control characters,
/// `\u00xx` for the rest, everything else (including non-ASCII) verbatim.
fn write_string(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0C}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}
