//! Tolerant helpers for the loosely-typed JSON bodies site adapters and the
//! proxy vendor API hand back. Fields that are documented as integers show
//! up as quoted strings often enough that every call site needs to try
//! both before giving up.

use serde_json::Value;

/// Some upstreams wrap a JSON object in surrounding prose (a log prefix, a
/// trailing comment) before it reaches us. Pull out the last top-level
/// `{...}` span and parse that, rather than the whole response body.
pub fn extract_last_json_object(body: &str) -> Option<Value> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

/// Read a field that the server may send as a JSON integer or as a numeric
/// string, e.g. `"remain": 12` in one response and `"remain": "12"` in
/// another.
pub fn field_as_i64(value: &Value, field: &str) -> Option<i64> {
    match value.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Same as [`field_as_i64`] but for booleans encoded as `true`/`false` or
/// as the strings `"true"`/`"false"`.
pub fn field_as_bool(value: &Value, field: &str) -> Option<bool> {
    match value.get(field)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read a string field, accepting only an actual JSON string.
pub fn field_as_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field)?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_last_json_object_strips_surrounding_prose() {
        let body = "callback({\"a\":1}) // trailing note";
        let value = extract_last_json_object(body).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extract_last_json_object_picks_outermost_braces() {
        let body = "prefix {\"code\":200,\"data\":[{\"x\":1}]} suffix";
        let value = extract_last_json_object(body).unwrap();
        assert_eq!(value["code"], 200);
    }

    #[test]
    fn extract_last_json_object_returns_none_without_braces() {
        assert!(extract_last_json_object("no json here").is_none());
    }

    #[test]
    fn field_as_i64_accepts_both_encodings() {
        let obj = json!({"remain": 12, "remain_str": "12"});
        assert_eq!(field_as_i64(&obj, "remain"), Some(12));
        assert_eq!(field_as_i64(&obj, "remain_str"), Some(12));
    }

    #[test]
    fn field_as_bool_accepts_both_encodings() {
        let obj = json!({"is_available": true, "is_available_str": "false"});
        assert_eq!(field_as_bool(&obj, "is_available"), Some(true));
        assert_eq!(field_as_bool(&obj, "is_available_str"), Some(false));
    }

    #[test]
    fn field_as_str_returns_none_for_non_string() {
        let obj = json!({"code": 200});
        assert_eq!(field_as_str(&obj, "code"), None);
    }
}
