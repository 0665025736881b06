//! Helpers for JSON extraction, time conversion and request building

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value as JsonValue, json};
use vela_core::resource::Value;

// =============================================================================
// Path Search
// =============================================================================

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Split an expression such as `a."OS-EXT-IPS:type"[0]|[0].b` into segments.
/// Returns `None` for malformed expressions.
fn parse_path(expr: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut chars = expr.chars().peekable();
    let mut current = String::new();

    let flush = |current: &mut String, segments: &mut Vec<Segment>| {
        if !current.is_empty() {
            segments.push(Segment::Key(std::mem::take(current)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '.' | '|' => flush(&mut current, &mut segments),
            '"' => {
                flush(&mut current, &mut segments);
                let mut quoted = String::new();
                loop {
                    match chars.next()? {
                        '"' => break,
                        ch => quoted.push(ch),
                    }
                }
                segments.push(Segment::Key(quoted));
            }
            '[' => {
                flush(&mut current, &mut segments);
                let mut digits = String::new();
                loop {
                    match chars.next()? {
                        ']' => break,
                        ch => digits.push(ch),
                    }
                }
                segments.push(Segment::Index(digits.trim().parse().ok()?));
            }
            ch => current.push(ch),
        }
    }
    flush(&mut current, &mut segments);
    Some(segments)
}

/// Look up a value by path expression.
///
/// Supports dotted keys, quoted keys containing dots or colons, `[n]`
/// indices and the `|[0]` first-element pipe. Explicit JSON `null` is
/// treated as absent.
pub fn path_search<'a>(expr: &str, json: &'a JsonValue) -> Option<&'a JsonValue> {
    let segments = parse_path(expr)?;
    let mut current = json;
    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(i) => current.as_array()?.get(*i)?,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

/// String at `expr`; numbers and booleans are rendered, anything else gives `default`
pub fn search_str(expr: &str, json: &JsonValue, default: &str) -> String {
    match path_search(expr, json) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

/// Integer at `expr`; numeric strings are parsed
pub fn search_i64(expr: &str, json: &JsonValue, default: i64) -> i64 {
    match path_search(expr, json) {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Float at `expr`; numeric strings are parsed
pub fn search_f64(expr: &str, json: &JsonValue, default: f64) -> f64 {
    match path_search(expr, json) {
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(default),
        Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Boolean at `expr`; `"true"`/`"false"` strings are accepted
pub fn search_bool(expr: &str, json: &JsonValue, default: bool) -> bool {
    match path_search(expr, json) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

/// Array at `expr`, or an empty slice
pub fn search_array<'a>(expr: &str, json: &'a JsonValue) -> &'a [JsonValue] {
    path_search(expr, json)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// Value at `expr` cloned, or JSON null
pub fn search_value(expr: &str, json: &JsonValue) -> JsonValue {
    path_search(expr, json).cloned().unwrap_or(JsonValue::Null)
}

/// Collect `field` from every element of the array at `expr`
pub fn pluck(expr: &str, field: &str, json: &JsonValue) -> Vec<JsonValue> {
    search_array(expr, json)
        .iter()
        .filter_map(|item| path_search(field, item).cloned())
        .collect()
}

/// Copy the named fields of `src` into a new object, skipping absent ones
pub fn pick(src: &JsonValue, names: &[&str]) -> JsonValue {
    JsonValue::Object(
        names
            .iter()
            .filter_map(|name| path_search(name, src).map(|v| (name.to_string(), v.clone())))
            .collect(),
    )
}

/// Build an object from `(attribute, path)` pairs, skipping absent paths
pub fn project(src: &JsonValue, fields: &[(&str, &str)]) -> JsonValue {
    JsonValue::Object(
        fields
            .iter()
            .filter_map(|(attr, expr)| path_search(expr, src).map(|v| (attr.to_string(), v.clone())))
            .collect(),
    )
}

// =============================================================================
// Time Conversion
// =============================================================================

/// Render epoch milliseconds as RFC3339 in UTC or local time.
/// Zero or negative input means "no time" and yields an empty string.
pub fn format_epoch_millis_rfc3339(ms: i64, utc: bool) -> String {
    if ms <= 0 {
        return String::new();
    }
    let Some(instant) = Utc.timestamp_millis_opt(ms).single() else {
        return String::new();
    };
    if utc {
        instant.to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        instant
            .with_timezone(&Local)
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Parse an RFC3339 string into epoch milliseconds
pub fn parse_rfc3339_millis(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Parse the time layouts the service returns into epoch milliseconds.
/// Strings without a zone are taken as UTC.
pub fn parse_service_time_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(ms) = parse_rfc3339_millis(s) {
        return Some(ms);
    }
    const LAYOUTS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
    ];
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Re-render a service time string as RFC3339, or `""` when unparseable
pub fn normalize_time_rfc3339(s: &str, utc: bool) -> String {
    parse_service_time_millis(s)
        .map(|ms| format_epoch_millis_rfc3339(ms, utc))
        .unwrap_or_default()
}

// =============================================================================
// Request Building
// =============================================================================

/// JSON null for zero values (empty string, zero, empty list, empty map)
pub fn value_ignore_empty(value: JsonValue) -> JsonValue {
    let empty = match &value {
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Number(n) => n.as_f64() == Some(0.0),
        JsonValue::Array(a) => a.is_empty(),
        JsonValue::Object(o) => o.is_empty(),
        JsonValue::Null => true,
        JsonValue::Bool(_) => false,
    };
    if empty { JsonValue::Null } else { value }
}

/// Drop null members from objects, recursively
pub fn remove_nil(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, remove_nil(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(remove_nil).collect()),
        other => other,
    }
}

/// Build `?k=v&...` from optional pairs, skipping `None` and empty values
pub fn build_query(params: &[(&str, Option<String>)]) -> String {
    let parts: Vec<String> = params
        .iter()
        .filter_map(|(k, v)| {
            v.as_ref()
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}={}", k, urlencoding::encode(v)))
        })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

/// Append `key=value` to a path that may already carry a query string
pub fn append_query(path: &str, key: &str, value: impl std::fmt::Display) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", path, sep, key, value)
}

// =============================================================================
// Tags
// =============================================================================

/// `{k: v}` to `[{key, value}]`, sorted by key
pub fn expand_tags(tags: &JsonValue) -> JsonValue {
    let Some(map) = tags.as_object() else {
        return JsonValue::Array(Vec::new());
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    JsonValue::Array(
        keys.into_iter()
            .map(|k| {
                let value = match &map[k] {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                json!({"key": k, "value": value})
            })
            .collect(),
    )
}

/// `[{key, value}]` to `{key: value}`
pub fn flatten_tags_to_map(tags: &JsonValue) -> JsonValue {
    let mut out = Map::new();
    for tag in tags.as_array().map(|a| a.as_slice()).unwrap_or(&[]) {
        let key = search_str("key", tag, "");
        if key.is_empty() {
            continue;
        }
        out.insert(key, JsonValue::String(search_str("value", tag, "")));
    }
    JsonValue::Object(out)
}

/// `[{key, value}]` to a list of `{key, value}` objects with string values
pub fn flatten_tags_to_list(tags: &JsonValue) -> JsonValue {
    JsonValue::Array(
        tags.as_array()
            .map(|a| a.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|tag| {
                json!({
                    "key": search_str("key", tag, ""),
                    "value": search_str("value", tag, ""),
                })
            })
            .collect(),
    )
}

// =============================================================================
// Attribute Conversion
// =============================================================================

/// Attributes as a JSON object, for path lookups and body building
pub fn attrs_to_json(attributes: &HashMap<String, Value>) -> JsonValue {
    JsonValue::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// JSON object back to attributes; nulls are dropped
pub fn json_to_attrs(json: &JsonValue) -> HashMap<String, Value> {
    json.as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `s` looks like a UUID (with or without dashes)
pub fn is_uuid(s: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12}$")
            .ok()
    })
    .as_ref()
    .is_some_and(|re| re.is_match(s))
}
