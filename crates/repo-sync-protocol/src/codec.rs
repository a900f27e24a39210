//! Deterministic CBOR encoding and field access helpers.
//!
//! Encoding follows RFC 8949 core deterministic rules:
//! - Map keys sorted by encoded byte comparison
//! - Integers use the smallest valid encoding
//! - Definite lengths only
//!
//! Every message is a map with small integer keys so that identical content
//! always produces identical bytes.

use ciborium::value::{Integer, Value};

use crate::error::{Result, SyncError};

/// Build an integer-keyed map entry.
pub(crate) fn entry(key: u64, value: Value) -> (Value, Value) {
    (Value::Integer(key.into()), value)
}

pub(crate) fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

pub(crate) fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

/// Encode a value to deterministic CBOR bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Decode CBOR bytes into a value.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| SyncError::MalformedMessage(e.to_string()))
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        _ => {
            return Err(SyncError::MalformedMessage(
                "unsupported CBOR value type".into(),
            ))
        }
    }
    Ok(())
}

/// Major types 0 and 1.
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // -1 encodes as 0, -2 as 1, ...
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Major type 5, keys sorted by their encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

/// Read-only view over an integer-keyed CBOR map.
pub(crate) struct MapView<'a> {
    entries: &'a [(Value, Value)],
    what: &'static str,
}

impl<'a> MapView<'a> {
    /// View `value` as a map; `what` names it in error messages.
    pub(crate) fn new(value: &'a Value, what: &'static str) -> Result<Self> {
        match value {
            Value::Map(entries) => Ok(Self { entries, what }),
            _ => Err(SyncError::MalformedMessage(format!("{what}: expected map"))),
        }
    }

    pub(crate) fn get(&self, key: u64) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if u64::try_from(*i).ok() == Some(key)))
            .map(|(_, v)| v)
    }

    fn missing(&self, field: &str) -> SyncError {
        SyncError::MalformedMessage(format!("{}: missing or invalid {field}", self.what))
    }

    pub(crate) fn u64(&self, key: u64, field: &str) -> Result<u64> {
        self.opt_u64(key, field)?.ok_or_else(|| self.missing(field))
    }

    /// `None` when absent, an error when present with the wrong type.
    pub(crate) fn opt_u64(&self, key: u64, field: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map(Some)
                .map_err(|_| self.missing(field)),
            Some(_) => Err(self.missing(field)),
        }
    }

    pub(crate) fn text(&self, key: u64, field: &str) -> Result<&'a str> {
        match self.get(key) {
            Some(Value::Text(s)) => Ok(s.as_str()),
            _ => Err(self.missing(field)),
        }
    }

    /// An absent array reads as empty.
    pub(crate) fn array(&self, key: u64, field: &str) -> Result<&'a [Value]> {
        match self.get(key) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(self.missing(field)),
        }
    }
}
