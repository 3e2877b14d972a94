//! JSON input adapter.
//!
//! Maps a JSON document onto a [`Value`] tree: objects become plain objects,
//! arrays dense arrays. Integers whose magnitude exceeds 2^53 are not exactly
//! representable as doubles and become [`BigInt`](crate::BigInt) values instead.

use serde_json::Value as Json;

use crate::encoder;
use crate::options::EncodeOptions;
use crate::registry::TypeRegistry;
use crate::value::Value;
use crate::{Error, Result};

/// Largest integer a double holds exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Parses a JSON document into a value tree.
pub fn parse_json(json: &str) -> Result<Value> {
    let json: Json = serde_json::from_str(json).map_err(|e| Error::InvalidJson(e.to_string()))?;
    Ok(from_json(&json))
}

pub fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => number(n),
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::array(items.iter().map(from_json)),
        Json::Object(map) => Value::object(map.iter().map(|(k, v)| (k.as_str(), from_json(v)))),
    }
}

fn number(n: &serde_json::Number) -> Value {
    if let Some(u) = n.as_u64() {
        if u > MAX_SAFE_INTEGER {
            return Value::bigint(u);
        }
    } else if let Some(i) = n.as_i64() {
        if i.unsigned_abs() > MAX_SAFE_INTEGER {
            return Value::bigint(i);
        }
    }
    // as_f64 ist ohne arbitrary_precision immer Some.
    Value::Number(n.as_f64().unwrap_or(f64::NAN))
}

/// Parses `json` and encodes it without extra types.
pub fn encode_json(json: &str, options: &EncodeOptions) -> Result<Vec<u8>> {
    let value = parse_json(json)?;
    encoder::encode(&value, &TypeRegistry::new(), options)
}
