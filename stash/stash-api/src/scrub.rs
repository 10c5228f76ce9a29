use serde_json::Value;

/// Strips null-valued keys from every mapping in a JSON tree.
/// The library distinguishes an absent field (leave unchanged) from an
/// explicit null (rejected in most inputs), so every outbound body passes
/// through this one transform instead of per-field conditionals.
pub fn scrub_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, scrub_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub_nulls).collect()),
        other => other,
    }
}
