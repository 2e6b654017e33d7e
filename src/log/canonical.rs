use serde_json::Value;
use std::collections::BTreeMap;

/// Re-serializes a JSON value with object keys sorted and numbers in a
/// stable textual form, so `payload_hash` is reproducible across processes
/// and across serializer versions.
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_else(|_| "null".to_string())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
