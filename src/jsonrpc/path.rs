//! Duck-typed JSON path lookup, re-architected (per spec.md's design note)
//! as a lookup over `serde_json::Value`'s existing tagged sum instead of a
//! dynamically-typed interface value the way the Go original's
//! `JSONPather` works over `interface{}`.

use serde_json::Value;

use crate::errors::ChaindError;

/// Looks up a dotted path (`"0"`, `"object.g.1.h"`) into `data`. Numeric
/// segments index arrays, everything else indexes objects.
///
/// A missing object key or an out-of-range array index is `BadPath`; a
/// path that resolves successfully to a JSON `null` is returned as
/// `Ok(&Value::Null)` — callers that need to distinguish "absent" from
/// "present but null" use the typed accessors below, which turn a
/// resolved `null` into `NullField`.
pub fn get<'a>(data: &'a Value, path: &str) -> Result<&'a Value, ChaindError> {
    if path.is_empty() {
        return Ok(data);
    }

    let mut loc = data;
    for part in path.split('.') {
        loc = match part.parse::<usize>() {
            Ok(idx) => {
                let arr = loc
                    .as_array()
                    .ok_or_else(|| ChaindError::BadPath(path.to_string()))?;
                arr.get(idx)
                    .ok_or_else(|| ChaindError::BadPath(path.to_string()))?
            }
            Err(_) => {
                let obj = loc
                    .as_object()
                    .ok_or_else(|| ChaindError::BadPath(path.to_string()))?;
                obj.get(part)
                    .ok_or_else(|| ChaindError::BadPath(path.to_string()))?
            }
        };
    }

    Ok(loc)
}

pub fn get_string(data: &Value, path: &str) -> Result<String, ChaindError> {
    let value = get(data, path)?;
    match value {
        Value::Null => Err(ChaindError::NullField(path.to_string())),
        Value::String(s) => Ok(s.clone()),
        _ => Err(ChaindError::BadPath(format!("{path} is not a string"))),
    }
}

pub fn get_bool(data: &Value, path: &str) -> Result<bool, ChaindError> {
    let value = get(data, path)?;
    match value {
        Value::Null => Err(ChaindError::NullField(path.to_string())),
        Value::Bool(b) => Ok(*b),
        _ => Err(ChaindError::BadPath(format!("{path} is not a bool"))),
    }
}

pub fn get_int(data: &Value, path: &str) -> Result<i64, ChaindError> {
    let value = get(data, path)?;
    match value {
        Value::Null => Err(ChaindError::NullField(path.to_string())),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ChaindError::BadPath(format!("{path} is not an integer"))),
        _ => Err(ChaindError::BadPath(format!("{path} is not a number"))),
    }
}

pub fn get_hex_uint(data: &Value, path: &str) -> Result<u64, ChaindError> {
    let raw = get_string(data, path)?;
    super::hex::hex_to_u64(&raw)
}

pub fn get_len(data: &Value, path: &str) -> Result<usize, ChaindError> {
    let value = get(data, path)?;
    match value {
        Value::Null => Err(ChaindError::NullField(path.to_string())),
        Value::Array(arr) => Ok(arr.len()),
        _ => Err(ChaindError::BadPath(format!("{path} is not an array"))),
    }
}

pub fn is_nil(data: &Value, path: &str) -> Result<bool, ChaindError> {
    Ok(matches!(get(data, path)?, Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_lookup_on_null_value_is_null_field() {
        let data = json!({"object": {"g": [null, {"h": null}]}});
        let err = get_string(&data, "object.g.0").unwrap_err();
        assert!(matches!(err, ChaindError::NullField(_)));
    }

    #[test]
    fn path_lookup_missing_key_is_bad_path() {
        let data = json!({"object": {}});
        let err = get_string(&data, "object.missing").unwrap_err();
        assert!(matches!(err, ChaindError::BadPath(_)));
    }

    #[test]
    fn path_lookup_out_of_range_index_is_bad_path() {
        let data = json!([1, 2]);
        let err = get_len(&data, "5").unwrap_err();
        assert!(matches!(err, ChaindError::BadPath(_)));
    }

    #[test]
    fn nested_numeric_and_object_segments_resolve() {
        let data = json!({"object": {"g": [1, {"h": "value"}]}});
        assert_eq!(get_string(&data, "object.g.1.h").unwrap(), "value");
    }

    #[test]
    fn get_len_returns_array_length() {
        let data = json!({"transactions": [1, 2, 3]});
        assert_eq!(get_len(&data, "transactions").unwrap(), 3);
    }
}
