//! Sensitive-data redaction for structured log fields
//!
//! Every structured field emitted by the logging pipeline passes through this
//! module before serialization. Values are redacted by field name: any key
//! that matches the sensitive vocabulary is replaced with a fixed marker,
//! recursively, for objects and arrays of arbitrary shape.
//!
//! # Features
//!
//! - Case-insensitive substring matching against a fixed field vocabulary
//! - Exact-match block list for HTTP header names
//! - Recursive sanitization with depth and node-count bounds
//! - Error context builder that exposes only safe error attributes
//!
//! # Example
//!
//! ```rust
//! use apex_gateway_core::observability::sanitize::{sanitize_map, REDACTED};
//! use serde_json::json;
//!
//! let fields = json!({"username": "alice", "password": "hunter2"});
//! let clean = sanitize_map(fields.as_object().unwrap());
//! assert_eq!(clean["username"], json!("alice"));
//! assert_eq!(clean["password"], json!(REDACTED));
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Replacement marker for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Maximum recursion depth before values are redacted wholesale
pub const MAX_DEPTH: usize = 10;

/// Total node-visitation budget per sanitization call. Guards against
/// pathologically wide payloads the depth bound alone does not catch.
const MAX_NODES: usize = 10_000;

/// Field-name substrings that mark a value as sensitive. Matched
/// case-insensitively after normalizing spaces and dashes to underscores.
const SENSITIVE_FIELD_PATTERNS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "auth",
    "credential",
    "private_key",
    "access_key",
    "session",
    "ssn",
    "pin",
    "cvv",
    "card_number",
    "cardnumber",
];

/// HTTP header names whose values are never logged. Exact match,
/// case-insensitive.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-csrf-token",
];

/// Check whether a field name denotes a sensitive value
///
/// Matching is a case-insensitive substring test, so `user_password`,
/// `Password` and `API-Key` all count as sensitive.
pub fn is_sensitive_field(name: &str) -> bool {
    let normalized = name.to_lowercase().replace([' ', '-'], "_");
    SENSITIVE_FIELD_PATTERNS
        .iter()
        .any(|pattern| normalized.contains(pattern))
}

/// Check whether an HTTP header carries credentials
///
/// Unlike field matching this is an exact (case-insensitive) comparison:
/// `Authorization` is blocked, `X-Authorized-By` is not.
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|header| name.eq_ignore_ascii_case(header))
}

/// Sanitize a single value identified by its field name
///
/// Sensitive field names redact the whole value regardless of its shape.
/// Objects and arrays are rebuilt recursively; each object entry is checked
/// under its own key, array elements carry no name of their own. Scalars
/// under non-sensitive names pass through unchanged. Values nested deeper
/// than [`MAX_DEPTH`] are redacted rather than traversed.
///
/// This function never fails and never panics.
pub fn sanitize_value(value: &Value, field_name: &str) -> Value {
    let mut budget = MAX_NODES;
    sanitize_inner(value, field_name, 0, &mut budget)
}

fn sanitize_inner(value: &Value, field_name: &str, depth: usize, budget: &mut usize) -> Value {
    if depth > MAX_DEPTH || *budget == 0 {
        return Value::String(REDACTED.to_string());
    }
    *budget -= 1;

    if is_sensitive_field(field_name) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), sanitize_inner(nested, key, depth + 1, budget)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_inner(item, "", depth + 1, budget))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

/// Sanitize a map of structured fields, keyed by field name
pub fn sanitize_map(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), sanitize_value(value, key)))
        .collect()
}

/// Sanitize HTTP headers for logging
///
/// Blocked header values are replaced with the redaction marker; everything
/// else passes through. Returns an ordered map so log output is
/// deterministic.
pub fn sanitize_headers<'a, I>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .map(|(name, value)| {
            let value = if is_sensitive_header(name) {
                REDACTED.to_string()
            } else {
                value.to_string()
            };
            (name.to_string(), value)
        })
        .collect()
}

/// Build a loggable context map for an error
///
/// Exposes only safe attributes: the error's type name (trailing path
/// segment), its display message, and the messages of its `source()` chain
/// when present. Extra fields are sanitized and merged without overriding
/// the error attributes.
///
/// # Example
///
/// ```rust
/// use apex_gateway_core::observability::sanitize::build_error_context;
///
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
/// let ctx = build_error_context(&err, None);
/// assert_eq!(ctx["error_type"], "Error");
/// assert_eq!(ctx["error_message"], "disk on fire");
/// ```
pub fn build_error_context<E>(error: &E, extra: Option<&Map<String, Value>>) -> Map<String, Value>
where
    E: std::error::Error,
{
    let mut context = Map::new();
    context.insert(
        "error_type".to_string(),
        Value::String(short_type_name::<E>().to_string()),
    );
    context.insert(
        "error_message".to_string(),
        Value::String(error.to_string()),
    );

    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(Value::String(cause.to_string()));
        source = cause.source();
    }
    if !chain.is_empty() {
        context.insert("error_chain".to_string(), Value::Array(chain));
    }

    if let Some(extra) = extra {
        for (key, value) in sanitize_map(extra) {
            context.entry(key).or_insert(value);
        }
    }

    context
}

/// Sanitize any serializable value
///
/// Serialization failures degrade to an opaque string rather than an error;
/// sanitization must never be the reason a log statement fails.
pub fn sanitize_serializable<T>(value: &T, field_name: &str) -> Value
where
    T: Serialize,
{
    match serde_json::to_value(value) {
        Ok(value) => sanitize_value(&value, field_name),
        Err(_) => Value::String(format!("<unserializable {}>", short_type_name::<T>())),
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.split('<')
        .next()
        .and_then(|base| base.rsplit("::").next())
        .unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn test_sensitive_field_detection() {
        assert!(is_sensitive_field("password"));
        assert!(is_sensitive_field("Password"));
        assert!(is_sensitive_field("PASSWORD"));
        assert!(is_sensitive_field("user_password"));
        assert!(is_sensitive_field("api_key"));
        assert!(is_sensitive_field("API-Key"));
        assert!(is_sensitive_field("api key"));
        assert!(is_sensitive_field("session_token"));
        assert!(is_sensitive_field("authorization"));
        assert!(is_sensitive_field("card_number"));

        assert!(!is_sensitive_field("username"));
        assert!(!is_sensitive_field("email"));
        assert!(!is_sensitive_field("request_count"));
    }

    #[test]
    fn test_sensitive_header_detection() {
        assert!(is_sensitive_header("authorization"));
        assert!(is_sensitive_header("Authorization"));
        assert!(is_sensitive_header("AUTHORIZATION"));
        assert!(is_sensitive_header("Cookie"));
        assert!(is_sensitive_header("x-api-key"));

        assert!(!is_sensitive_header("content-type"));
        assert!(!is_sensitive_header("accept"));
        // Substring matches do not apply to headers
        assert!(!is_sensitive_header("x-authorized-by"));
    }

    #[test]
    fn test_sanitize_value_redacts_all_shapes() {
        // A sensitive field name redacts regardless of the value's type
        assert_eq!(
            sanitize_value(&json!("hunter2"), "password"),
            json!(REDACTED)
        );
        assert_eq!(sanitize_value(&json!(1234), "pin"), json!(REDACTED));
        assert_eq!(
            sanitize_value(&json!({"inner": "x"}), "credentials"),
            json!(REDACTED)
        );
        assert_eq!(
            sanitize_value(&json!(["a", "b"]), "access_keys"),
            json!(REDACTED)
        );
    }

    #[test]
    fn test_sanitize_value_preserves_non_sensitive() {
        let value = json!({
            "user": {"name": "alice", "age": 30},
            "tags": ["a", "b"],
            "count": 7
        });
        assert_eq!(sanitize_value(&value, "payload"), value);
    }

    #[test]
    fn test_sanitize_map_mixed_fields() {
        let fields = json!({
            "username": "alice",
            "password": "hunter2",
            "email": "alice@example.com"
        });
        let clean = sanitize_map(fields.as_object().unwrap());

        assert_eq!(clean["username"], json!("alice"));
        assert_eq!(clean["password"], json!(REDACTED));
        assert_eq!(clean["email"], json!("alice@example.com"));
    }

    #[test]
    fn test_sanitize_nested_objects() {
        let fields = json!({
            "user": {"name": "alice", "secret_key": "abc"},
            "public": "visible"
        });
        let clean = sanitize_map(fields.as_object().unwrap());

        assert_eq!(clean["user"]["name"], json!("alice"));
        assert_eq!(clean["user"]["secret_key"], json!(REDACTED));
        assert_eq!(clean["public"], json!("visible"));
    }

    #[test]
    fn test_sanitize_objects_inside_arrays() {
        let value = json!([
            {"name": "a", "token": "t1"},
            {"name": "b", "token": "t2"},
            42
        ]);
        let clean = sanitize_value(&value, "items");

        assert_eq!(clean[0]["name"], json!("a"));
        assert_eq!(clean[0]["token"], json!(REDACTED));
        assert_eq!(clean[1]["token"], json!(REDACTED));
        assert_eq!(clean[2], json!(42));
    }

    #[test]
    fn test_max_depth_redacts_instead_of_recursing() {
        // Build a chain nested two levels past the depth bound
        let mut value = json!("leaf");
        for _ in 0..(MAX_DEPTH + 2) {
            value = json!({ "level": value });
        }

        let mut clean = sanitize_value(&value, "root");
        for _ in 0..=MAX_DEPTH {
            clean = clean["level"].clone();
        }
        // Whatever sits past the bound has collapsed into the marker
        assert_eq!(clean, json!(REDACTED));
    }

    #[test]
    fn test_node_budget_redacts_pathological_width() {
        let wide = Value::Array(vec![json!(1); 20_000]);
        let clean = sanitize_value(&wide, "items");

        let items = clean.as_array().unwrap();
        assert_eq!(items[0], json!(1));
        assert_eq!(items[items.len() - 1], json!(REDACTED));
    }

    #[test]
    fn test_build_error_context_basic() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let ctx = build_error_context(&err, None);

        assert_eq!(ctx["error_type"], json!("Error"));
        assert_eq!(ctx["error_message"], json!("connection reset"));
        assert!(!ctx.contains_key("error_chain"));
    }

    #[derive(Debug)]
    struct WrappedError {
        source: std::io::Error,
    }

    impl fmt::Display for WrappedError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer failure")
        }
    }

    impl StdError for WrappedError {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.source)
        }
    }

    #[test]
    fn test_build_error_context_with_source_chain() {
        let err = WrappedError {
            source: std::io::Error::new(std::io::ErrorKind::Other, "inner failure"),
        };
        let ctx = build_error_context(&err, None);

        assert_eq!(ctx["error_type"], json!("WrappedError"));
        assert_eq!(ctx["error_message"], json!("outer failure"));
        assert_eq!(ctx["error_chain"], json!(["inner failure"]));
    }

    #[test]
    fn test_build_error_context_sanitizes_extra() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "denied");
        let extra = json!({"user": "alice", "api_key": "xyz"});
        let ctx = build_error_context(&err, extra.as_object());

        assert_eq!(ctx["user"], json!("alice"));
        assert_eq!(ctx["api_key"], json!(REDACTED));
        // Extra fields never override the error attributes
        assert_eq!(ctx["error_message"], json!("denied"));
    }

    #[test]
    fn test_sanitize_headers_blocks_credentials() {
        let headers = vec![
            ("Authorization", "Bearer abc123"),
            ("Content-Type", "application/json"),
            ("cookie", "session=xyz"),
        ];
        let clean = sanitize_headers(headers);

        assert_eq!(clean["Authorization"], REDACTED);
        assert_eq!(clean["Content-Type"], "application/json");
        assert_eq!(clean["cookie"], REDACTED);
    }

    #[derive(Serialize)]
    struct LoginAttempt {
        username: String,
        password: String,
    }

    #[test]
    fn test_sanitize_serializable_struct() {
        let attempt = LoginAttempt {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let clean = sanitize_serializable(&attempt, "attempt");

        assert_eq!(clean["username"], json!("alice"));
        assert_eq!(clean["password"], json!(REDACTED));
    }
}
