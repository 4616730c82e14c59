//! Canonical byte encoding for world-state values.
//!
//! Every peer endorsing a transaction has to write byte-identical values for
//! the same logical record, otherwise the read/write sets diverge and the
//! endorsements cannot be matched. The encoding here is compact JSON with:
//!
//! * object keys sorted ascending (byte order) at every nesting level,
//! * array order preserved,
//! * a single escaping rule for strings,
//! * numbers rendered with the shortest round-trip digits in the layout used by
//!   ECMAScript `Number.prototype.toString`, so values written by JavaScript
//!   contracts hash the same as values written here.
//!
//! [`decode_value`] only accepts bytes that are already in this form.

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

use crate::records::{Record, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("value is valid JSON but not in canonical form")]
    NonCanonical,
    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaError),
}

/// Canonical bytes for an arbitrary JSON value.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(128);
    write_value(&mut out, value)?;
    Ok(out)
}

/// Canonical bytes for a record, `docType` included.
pub fn encode(record: &Record) -> Result<Vec<u8>, CodecError> {
    encode_value(&record.to_value()?)
}

/// Parses canonical bytes. Anything that re-encodes differently (unsorted
/// keys, whitespace, duplicate keys, `1.0` instead of `1`, ...) is rejected.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;
    if encode_value(&value)? != bytes {
        return Err(CodecError::NonCanonical);
    }
    Ok(value)
}

pub fn decode(bytes: &[u8]) -> Result<Record, CodecError> {
    let value = decode_value(bytes)?;
    Ok(Record::from_value(value)?)
}

/// SHA-256 over already-encoded bytes.
pub fn content_hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

pub fn record_hash(record: &Record) -> Result<[u8; 32], CodecError> {
    Ok(content_hash(&encode(record)?))
}

/// The number `decode_value` yields for the canonical form of `number`.
///
/// Integral floats within the integer range print without a fraction and
/// parse back as integers, so they are stored as integers up front.
pub fn normalize_number(number: Number) -> Number {
    match number.as_f64() {
        Some(f) if number.is_f64() && f.fract() == 0.0 => {
            if (0.0..18_446_744_073_709_551_616.0).contains(&f) {
                Number::from(f as u64)
            } else if (-9_223_372_036_854_775_808.0..0.0).contains(&f) {
                Number::from(f as i64)
            } else {
                number
            }
        }
        _ => number,
    }
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> serde_json::Result<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(number) => write_number(out, number),
        Value::String(s) => serde_json::to_writer(&mut *out, s)?,
        Value::Array(items) => {
            out.push(b'[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            // serde_json::Map is only sorted without `preserve_order`; do not rely on it.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(out, item)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_number(out: &mut Vec<u8>, number: &Number) {
    if let Some(n) = number.as_u64() {
        out.extend_from_slice(n.to_string().as_bytes());
    } else if let Some(n) = number.as_i64() {
        out.extend_from_slice(n.to_string().as_bytes());
    } else if let Some(f) = number.as_f64() {
        out.extend_from_slice(format_f64(f).as_bytes());
    }
}

/// ECMAScript `Number::toString(10)` for finite values.
fn format_f64(value: f64) -> String {
    if value == 0.0 {
        // covers -0
        return "0".to_string();
    }
    // `{:e}` yields the shortest digits that round-trip, e.g. "1.2345e3".
    let sci = format!("{:e}", value.abs());
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return value.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return value.to_string();
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exp + 1;

    let mut s = String::with_capacity(digits.len() + 8);
    if value.is_sign_negative() {
        s.push('-');
    }
    if k <= n && n <= 21 {
        s.push_str(&digits);
        s.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        s.push_str(&digits[..n as usize]);
        s.push('.');
        s.push_str(&digits[n as usize..]);
    } else if -6 < n && n <= 0 {
        s.push_str("0.");
        s.extend(std::iter::repeat('0').take((-n) as usize));
        s.push_str(&digits);
    } else {
        let e = n - 1;
        s.push_str(&digits[..1]);
        if k > 1 {
            s.push('.');
            s.push_str(&digits[1..]);
        }
        s.push('e');
        s.push(if e >= 0 { '+' } else { '-' });
        s.push_str(&e.abs().to_string());
    }
    s
}
