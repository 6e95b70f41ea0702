//! Canonical JSON (RFC 8785) and base64url encoding.
//!
//! Signatures and content hashes are computed over canonical bytes, so the
//! serialization here must be byte-for-byte deterministic and identical
//! across every implementation of the protocol:
//!
//! - object keys sorted by UTF-16 code units (not Unicode scalar order --
//!   the two differ for supplementary-plane characters);
//! - numbers printed with the ECMAScript `Number::toString` algorithm;
//! - minimal string escaping (`"`, `\`, and C0 controls only);
//! - no insignificant whitespace.
//!
//! base64url is RFC 4648 §5 with padding stripped on encode; decoding
//! accepts padded or unpadded input.

use crate::error::{Error, Result};
use base64::Engine;
use serde_json::Value;
use std::cmp::Ordering;

/// Serialize a JSON value to its canonical form.
///
/// Fails with a validation error if the value contains a non-finite double.
pub fn to_canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Canonical form as UTF-8 bytes, the exact signing/hashing preimage.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(to_canonical_json(value)?.into_bytes())
}

/// Encode bytes as base64url without padding.
pub fn b64u_encode(bytes: impl AsRef<[u8]>) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url input, tolerating trailing `=` padding.
pub fn b64u_decode(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.trim_end_matches('=');
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| Error::validation(format!("invalid base64url: {}", e)))
}

fn write_value(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| utf16_cmp(a, b));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[*key])?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Compare strings by UTF-16 code units, the RFC 8785 key order.
fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{0009}' => out.push_str("\\t"),
            '\u{000A}' => out.push_str("\\n"),
            '\u{000C}' => out.push_str("\\f"),
            '\u{000D}' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_number(out: &mut String, n: &serde_json::Number) -> Result<()> {
    // Integers that arrived as integers stay integers.
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
        return Ok(());
    }
    let f = n
        .as_f64()
        .ok_or_else(|| Error::validation(format!("unrepresentable number: {}", n)))?;
    if !f.is_finite() {
        return Err(Error::validation("non-finite number in payload"));
    }
    out.push_str(&format_double(f));
    Ok(())
}

/// ECMAScript `Number::toString` for finite doubles.
///
/// Rust's `Display` already yields the shortest round-tripping digit string
/// but always in positional notation; this reshapes it into the ES2015 form
/// (positional for 1e-6 <= |x| < 1e21, normalized `d.ddde±k` otherwise).
fn format_double(f: f64) -> String {
    if f == 0.0 {
        // covers -0.0 as well
        return "0".to_string();
    }
    let neg = f < 0.0;
    let positional = format!("{}", f.abs());

    // Extract the significant digits `s` and the ES decimal exponent `n`,
    // where the value equals 0.s * 10^n.
    let (digits, n) = match positional.find('.') {
        Some(dot) => {
            let int_part = &positional[..dot];
            let frac = &positional[dot + 1..];
            if int_part == "0" {
                let leading_zeros = frac.len() - frac.trim_start_matches('0').len();
                (frac[leading_zeros..].to_string(), -(leading_zeros as i64))
            } else {
                (format!("{}{}", int_part, frac), int_part.len() as i64)
            }
        }
        None => {
            let trimmed = positional.trim_end_matches('0');
            (trimmed.to_string(), positional.len() as i64)
        }
    };
    let k = digits.len() as i64;

    let mut out = String::new();
    if neg {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(&digits);
        for _ in 0..(n - k) {
            out.push('0');
        }
    } else if 0 < n && n <= 21 {
        out.push_str(&digits[..n as usize]);
        out.push('.');
        out.push_str(&digits[n as usize..]);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        for _ in 0..(-n) {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        let exp = n - 1;
        if exp >= 0 {
            out.push('+');
        }
        out.push_str(&exp.to_string());
    }
    out
}
