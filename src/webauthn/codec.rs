//! # Credential Codec
//!
//! Converts binary WebAuthn fields between the encodings seen on the wire and
//! in stored rows, and canonical bytes.
//!
//! Browsers, client libraries and older rows disagree on how to carry bytes:
//! padded or unpadded base64, the URL-safe alphabet, JSON arrays of numbers,
//! serialized typed arrays (`{"0": 12, "1": 34}`), Postgres-style `\x` hex and
//! whole request bodies in CBOR. Ceremony code only ever sees `Vec<u8>`.

use crate::error::{AppError, AppResult};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Standard alphabet, padding optional
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// URL-safe alphabet, padding optional
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Which strategy produced the bytes of a string value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PrefixedHex,
    Base64,
    Base64Url,
    Hex,
    Raw,
}

/// Decode a transport value into canonical bytes
///
/// Strings are tried as standard base64, URL-safe base64, hex, and finally
/// taken as their own UTF-8 bytes. A `0x`/`\x` prefix followed by valid hex is
/// an explicit marker and is honoured before base64. Arrays of integers and
/// objects keyed `"0".."n-1"` are raw byte sequences.
pub fn decode_transport_value(value: &Value) -> AppResult<Vec<u8>> {
    match value {
        Value::String(s) => Ok(decode_transport_str(s).1),
        Value::Array(items) => items.iter().map(byte_from_json).collect(),
        Value::Object(map) => decode_indexed_object(map),
        other => Err(AppError::Decode(format!(
            "unsupported transport value of type {}",
            json_type_name(other)
        ))),
    }
}

/// Decode a string with the fixed strategy order, reporting the winner
pub fn decode_transport_str(s: &str) -> (Strategy, Vec<u8>) {
    if let Some(bytes) = strip_hex_prefix(s)
        .filter(|rest| !rest.is_empty())
        .and_then(|rest| hex::decode(rest).ok())
    {
        return (Strategy::PrefixedHex, bytes);
    }
    if let Ok(bytes) = STANDARD_LENIENT.decode(s) {
        return (Strategy::Base64, bytes);
    }
    if let Ok(bytes) = URL_SAFE_LENIENT.decode(s) {
        return (Strategy::Base64Url, bytes);
    }
    if let Ok(bytes) = hex::decode(s) {
        return (Strategy::Hex, bytes);
    }
    (Strategy::Raw, s.as_bytes().to_vec())
}

/// Unpadded URL-safe base64, the form every outbound binary field takes
pub fn encode_for_transport(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a credential id as persisted in the `credentials` table
///
/// New rows hold unpadded URL-safe base64. Legacy rows may hold standard
/// base64, hex, or `\x`-hex wrapping the ASCII of a base64 string; the last
/// form is unwrapped twice.
pub fn decode_stored_credential_id(stored: &str) -> Vec<u8> {
    let (strategy, bytes) = decode_transport_str(stored);
    if strategy == Strategy::PrefixedHex {
        if let Some(inner) = std::str::from_utf8(&bytes)
            .ok()
            .filter(|text| !text.is_empty() && text.bytes().all(is_base64_char))
        {
            if let Ok(unwrapped) = STANDARD_LENIENT
                .decode(inner)
                .or_else(|_| URL_SAFE_LENIENT.decode(inner))
            {
                return unwrapped;
            }
        }
    }
    bytes
}

/// Look up `key` in a JSON object and decode it, `MalformedRequest` if absent
pub fn required_field(object: &Value, key: &str) -> AppResult<Vec<u8>> {
    match object.get(key) {
        None | Some(Value::Null) => Err(AppError::MalformedRequest(format!(
            "missing field '{key}'"
        ))),
        Some(value) => decode_transport_value(value).map_err(|e| in_field(key, e)),
    }
}

/// Like [`required_field`] but absent or null yields `None`
pub fn optional_field(object: &Value, key: &str) -> AppResult<Option<Vec<u8>>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode_transport_value(value)
            .map(Some)
            .map_err(|e| in_field(key, e)),
    }
}

fn in_field(key: &str, error: AppError) -> AppError {
    match error {
        AppError::Decode(msg) => AppError::Decode(format!("field '{key}': {msg}")),
        other => other,
    }
}

/// Parse a request body that is either JSON or CBOR
///
/// `application/cbor` goes straight to CBOR; anything else is tried as JSON
/// first and CBOR second. CBOR byte strings become JSON byte arrays so the
/// rest of the pipeline can decode them with [`decode_transport_value`].
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> AppResult<Value> {
    let wants_cbor = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("cbor"))
        .unwrap_or(false);

    if !wants_cbor {
        if let Ok(value) = serde_json::from_slice::<Value>(body) {
            return Ok(value);
        }
    }

    let cbor: ciborium::value::Value = ciborium::from_reader(body).map_err(|e| {
        AppError::MalformedRequest(format!("request body is neither JSON nor CBOR: {e}"))
    })?;

    match cbor_to_json(cbor)? {
        // Some clients CBOR-encode the JSON text itself
        Value::String(text) => serde_json::from_str(&text).map_err(|_| {
            AppError::MalformedRequest("CBOR body holds a string that is not JSON".to_string())
        }),
        value => Ok(value),
    }
}

/// Convert a CBOR value into JSON, byte strings becoming integer arrays
pub fn cbor_to_json(value: ciborium::value::Value) -> AppResult<Value> {
    use ciborium::value::Value as Cbor;

    Ok(match value {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(i) => integer_to_json(i128::from(i))?,
        Cbor::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Cbor::Text(s) => Value::String(s),
        Cbor::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
        Cbor::Tag(_, inner) => cbor_to_json(*inner)?,
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(cbor_to_json)
                .collect::<AppResult<Vec<_>>>()?,
        ),
        Cbor::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match key {
                    Cbor::Text(s) => s,
                    Cbor::Integer(i) => i128::from(i).to_string(),
                    _ => {
                        return Err(AppError::MalformedRequest(
                            "CBOR map keys must be text or integers".to_string(),
                        ))
                    }
                };
                map.insert(key, cbor_to_json(value)?);
            }
            Value::Object(map)
        }
        _ => {
            return Err(AppError::MalformedRequest(
                "unsupported CBOR value in request body".to_string(),
            ))
        }
    })
}

fn integer_to_json(i: i128) -> AppResult<Value> {
    if let Ok(v) = i64::try_from(i) {
        Ok(Value::from(v))
    } else if let Ok(v) = u64::try_from(i) {
        Ok(Value::from(v))
    } else {
        Err(AppError::MalformedRequest("CBOR integer out of range".to_string()))
    }
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("\\x")
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
}

fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'-' | b'_' | b'=')
}

fn byte_from_json(value: &Value) -> AppResult<u8> {
    value
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| AppError::Decode("byte array holds a value outside 0..=255".to_string()))
}

fn decode_indexed_object(map: &Map<String, Value>) -> AppResult<Vec<u8>> {
    let mut indexed = BTreeMap::new();
    for (key, value) in map {
        let index: usize = key
            .parse()
            .map_err(|_| AppError::Decode("object keys must be byte indices".to_string()))?;
        indexed.insert(index, byte_from_json(value)?);
    }
    if indexed.keys().copied().ne(0..indexed.len()) {
        return Err(AppError::Decode("byte indices are not contiguous".to_string()));
    }
    Ok(indexed.into_values().collect())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
