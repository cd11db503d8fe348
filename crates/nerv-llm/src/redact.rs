use serde_json::Value;

pub const MASK: &str = "***";

const SECRET_MARKERS: [&str; 5] = ["token", "secret", "password", "authorization", "key"];

/// Whether a field or header name looks like it carries a credential.
pub fn is_secret_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    SECRET_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Copy of `value` with every non-null value under a secret-looking key
/// masked, containers included.
pub fn redact_value(value: &Value) -> Value {
    redact(value, false)
}

/// Keys of a JSON-schema `properties` map name output fields, not credentials.
fn redact(value: &Value, field_names: bool) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = if !field_names && !v.is_null() && is_secret_name(k) {
                        Value::String(MASK.to_string())
                    } else {
                        redact(v, !field_names && k == "properties")
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| redact(item, false)).collect()),
        other => other.clone(),
    }
}

pub fn redact_header(name: &str, value: &str) -> String {
    if is_secret_name(name) {
        MASK.to_string()
    } else {
        value.to_string()
    }
}
