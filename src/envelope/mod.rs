//! Response envelopes: the one wire shape for every outcome.
//!
//! Every response this crate produces, success or failure, is serialized as an
//! [`Envelope`]:
//!
//! ```json
//! { "data": { "id": 1 }, "statusCode": 200, "message": "Request successful" }
//! ```
//!
//! The builders in this module are total functions. They accept loosely shaped
//! input (plain strings, JSON objects, prior envelopes, [`ErrorRecord`]s and
//! native Rust errors) and never fail: malformed input degrades to defaults.
//!
//! # Example
//!
//! ```rust
//! use axum_envelope::{build_success, build_error};
//! use serde_json::json;
//!
//! let ok = build_success(json!({ "data": { "id": 1 } }));
//! assert_eq!(ok.status_code, 200);
//! assert_eq!(ok.message.as_deref(), Some("Request successful"));
//!
//! let err = build_error(json!({ "statusCode": 404, "statusMessage": "No such user" }));
//! assert_eq!(err.to_envelope().status_code, 404);
//! ```

mod record;

pub use record::*;

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Message used by [`build_success`] when the input carries none.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Request successful";

/// Lowest status code accepted by [`sanitize_status_code`].
pub const MIN_STATUS_CODE: u16 = 100;

/// Highest status code accepted by [`sanitize_status_code`].
pub const MAX_STATUS_CODE: u16 = 999;

/// The normalized response shape `{data?, statusCode, message?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Opaque payload; present on success or when an error carries auxiliary data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Always within `100..=999`.
    pub status_code: u16,
    /// Human readable, HTML-entity escaped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    /// Creates a 200 envelope wrapping `data` with the default success message.
    pub fn with_data(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
            status_code: 200,
            message: Some(DEFAULT_SUCCESS_MESSAGE.to_string()),
        }
    }

    /// Returns the envelope's status as an HTTP status code.
    ///
    /// `status_code` is range checked on construction, so this only falls back
    /// to 500 for envelopes assembled by hand with an out-of-range value.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Response extension marking a body that was shaped by the envelope builder.
///
/// The not-found stage uses it to tell a handler's deliberate 404 envelope
/// apart from a request that matched no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enveloped;

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self)).into_response();
        response.extensions_mut().insert(Enveloped);
        response
    }
}

/// Input accepted by [`build_success`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A bare message.
    Text(String),
    /// A structured object, read for `data`, `statusCode`/`status` and
    /// `statusMessage`/`statusText`/`message`.
    Object(Value),
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Payload::Text(s),
            other => Payload::Object(other),
        }
    }
}

impl From<Envelope> for Payload {
    fn from(envelope: Envelope) -> Self {
        Payload::Object(serde_json::to_value(envelope).unwrap_or(Value::Null))
    }
}

/// Escapes `&`, `"`, `'`, `<` and `>` to HTML entities.
///
/// `&` is escaped first so that the entities produced for the other characters
/// are not escaped again. The function is not idempotent: escaping an already
/// escaped string escapes its `&` a second time.
///
/// ```rust
/// use axum_envelope::sanitize_message;
///
/// assert_eq!(sanitize_message("&<>\"'"), "&amp;&lt;&gt;&quot;&#39;");
/// ```
pub fn sanitize_message(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Range checks a status code given as a JSON number or numeric string.
///
/// Absent and falsy inputs (`null`, `false`, `0`, `""`) return `fallback`.
/// Strings are parsed as base-10 integers from their leading digits; a string
/// with no leading digits fails the range check and returns `fallback`, as do
/// non-integral numbers and any value outside `100..=999`.
///
/// ```rust
/// use axum_envelope::sanitize_status_code;
/// use serde_json::json;
///
/// assert_eq!(sanitize_status_code(Some(&json!(404)), 200), 404);
/// assert_eq!(sanitize_status_code(Some(&json!("503")), 200), 503);
/// assert_eq!(sanitize_status_code(Some(&json!(42)), 200), 200);
/// assert_eq!(sanitize_status_code(None, 500), 500);
/// ```
pub fn sanitize_status_code(code: Option<&Value>, fallback: u16) -> u16 {
    let parsed = match code {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return fallback,
        Some(Value::String(s)) if s.is_empty() => return fallback,
        Some(Value::String(s)) => parse_leading_int(s),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 0.0 => return fallback,
            Some(f) if f.fract() == 0.0 => Some(f as i64),
            _ => None,
        },
        Some(_) => None,
    };

    match parsed {
        Some(code) if (MIN_STATUS_CODE as i64..=MAX_STATUS_CODE as i64).contains(&code) => {
            code as u16
        }
        _ => fallback,
    }
}

/// Builds a success envelope.
///
/// - Text input becomes `{statusCode: 200, message}` with no `data` key. The
///   message is kept as given.
/// - Object input becomes `{data, statusCode, message}` where the status comes
///   from `statusCode` or `status` (default 200) and the message from
///   `statusMessage`, `statusText` or `message` (default
///   [`DEFAULT_SUCCESS_MESSAGE`]).
pub fn build_success(input: impl Into<Payload>) -> Envelope {
    match input.into() {
        Payload::Text(message) => Envelope {
            data: None,
            status_code: 200,
            message: Some(message),
        },
        Payload::Object(value) => {
            let status = first_present(&value, &["statusCode", "status"]);
            let message = first_present(&value, &["statusMessage", "statusText", "message"])
                .and_then(as_text)
                .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string());

            Envelope {
                data: field(&value, "data").cloned(),
                status_code: sanitize_status_code(status, 200),
                message: Some(sanitize_message(&message)),
            }
        }
    }
}

/// Returns the named field when `value` is an object and the field is not null.
pub(crate) fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object()?.get(key).filter(|v| !v.is_null())
}

/// Returns the first non-null field among `keys`.
pub(crate) fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| field(value, key))
}

/// Renders scalar values as text. Objects and arrays have no message form.
pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses the leading base-10 integer of `s`, skipping leading whitespace and
/// accepting one sign character. Returns `None` when no digit follows.
fn parse_leading_int(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    // Saturate rather than fail: anything this large is out of range anyway.
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_message_escapes_all_entities() {
        assert_eq!(sanitize_message("&<>\"'"), "&amp;&lt;&gt;&quot;&#39;");
    }

    #[test]
    fn test_sanitize_message_ampersand_first() {
        // Escaping `<` must not produce an entity that gets its `&` escaped again
        assert_eq!(sanitize_message("<b>"), "&lt;b&gt;");
    }

    #[test]
    fn test_sanitize_message_is_not_idempotent() {
        let once = sanitize_message("a & b");
        assert_eq!(once, "a &amp; b");
        assert_eq!(sanitize_message(&once), "a &amp;amp; b");
    }

    #[test]
    fn test_sanitize_message_empty() {
        assert_eq!(sanitize_message(""), "");
    }

    #[test]
    fn test_sanitize_status_code_falsy_inputs() {
        assert_eq!(sanitize_status_code(None, 200), 200);
        assert_eq!(sanitize_status_code(Some(&Value::Null), 500), 500);
        assert_eq!(sanitize_status_code(Some(&json!(0)), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!("")), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!(false)), 500), 500);
    }

    #[test]
    fn test_sanitize_status_code_strings() {
        assert_eq!(sanitize_status_code(Some(&json!("404")), 200), 404);
        assert_eq!(sanitize_status_code(Some(&json!(" 201")), 200), 201);
        assert_eq!(sanitize_status_code(Some(&json!("418teapot")), 200), 418);
        assert_eq!(sanitize_status_code(Some(&json!("teapot")), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!("-404")), 200), 200);
    }

    #[test]
    fn test_sanitize_status_code_boundaries() {
        assert_eq!(sanitize_status_code(Some(&json!(99)), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!(100)), 200), 100);
        assert_eq!(sanitize_status_code(Some(&json!(999)), 200), 999);
        assert_eq!(sanitize_status_code(Some(&json!(1000)), 200), 200);
    }

    #[test]
    fn test_sanitize_status_code_non_numeric_shapes() {
        assert_eq!(sanitize_status_code(Some(&json!(true)), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!([404])), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!({"code": 404})), 200), 200);
        assert_eq!(sanitize_status_code(Some(&json!(404.5)), 200), 200);
    }

    proptest! {
        #[test]
        fn prop_in_range_codes_pass_through(code in 100u16..=999) {
            prop_assert_eq!(sanitize_status_code(Some(&json!(code)), 200), code);
            prop_assert_eq!(sanitize_status_code(Some(&json!(code.to_string())), 500), code);
        }

        #[test]
        fn prop_out_of_range_codes_fall_back(code in prop_oneof![1i64..100, 1000i64..100_000, -100_000i64..0]) {
            prop_assert_eq!(sanitize_status_code(Some(&json!(code)), 200), 200);
            prop_assert_eq!(sanitize_status_code(Some(&json!(code.to_string())), 500), 500);
        }

        #[test]
        fn prop_non_numeric_strings_fall_back(s in "[a-zA-Z]{1,12}") {
            prop_assert_eq!(sanitize_status_code(Some(&json!(s)), 200), 200);
        }

        #[test]
        fn prop_sanitized_message_has_no_raw_markup(s in ".*") {
            let out = sanitize_message(&s);
            prop_assert!(!out.contains('<'));
            prop_assert!(!out.contains('>'));
            prop_assert!(!out.contains('"'));
            prop_assert!(!out.contains('\''));
        }
    }

    #[test]
    fn test_build_success_from_text() {
        let envelope = build_success("x");
        assert_eq!(
            envelope,
            Envelope {
                data: None,
                status_code: 200,
                message: Some("x".to_string()),
            }
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, json!({"statusCode": 200, "message": "x"}));
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_build_success_from_object_defaults() {
        let envelope = build_success(json!({"data": {"id": 1}}));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"statusCode": 200, "message": "Request successful", "data": {"id": 1}})
        );
    }

    #[test]
    fn test_build_success_status_precedence() {
        let envelope = build_success(json!({"statusCode": 201, "status": 202}));
        assert_eq!(envelope.status_code, 201);

        let envelope = build_success(json!({"status": "202"}));
        assert_eq!(envelope.status_code, 202);

        let envelope = build_success(json!({"statusCode": 5000}));
        assert_eq!(envelope.status_code, 200);
    }

    #[test]
    fn test_build_success_message_precedence() {
        let envelope = build_success(json!({
            "statusMessage": "<created>",
            "statusText": "text",
            "message": "message",
        }));
        assert_eq!(envelope.message.as_deref(), Some("&lt;created&gt;"));

        let envelope = build_success(json!({"statusText": "text", "message": "message"}));
        assert_eq!(envelope.message.as_deref(), Some("text"));

        let envelope = build_success(json!({"message": "message"}));
        assert_eq!(envelope.message.as_deref(), Some("message"));
    }

    #[test]
    fn test_build_success_text_is_not_escaped() {
        let envelope = build_success("<b>Tom & Jerry</b>");
        assert_eq!(envelope.message.as_deref(), Some("<b>Tom & Jerry</b>"));

        let envelope = build_success(json!({"message": "<b>Tom & Jerry</b>"}));
        assert_eq!(
            envelope.message.as_deref(),
            Some("&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;")
        );
    }

    #[test]
    fn test_build_success_from_json_string_is_text() {
        let envelope = build_success(json!("plain"));
        assert_eq!(envelope.message.as_deref(), Some("plain"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_build_success_from_non_object_value() {
        let envelope = build_success(json!([1, 2, 3]));
        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.message.as_deref(), Some(DEFAULT_SUCCESS_MESSAGE));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_build_success_from_prior_envelope() {
        let first = build_success(json!({"data": [1], "statusCode": 201, "message": "made"}));
        let second = build_success(first.clone());
        assert_eq!(second.status_code, 201);
        assert_eq!(second.data, first.data);
        assert_eq!(second.message.as_deref(), Some("made"));
    }

    #[test]
    fn test_envelope_with_data() {
        let envelope = Envelope::with_data(json!({"ok": true}));
        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.message.as_deref(), Some(DEFAULT_SUCCESS_MESSAGE));
    }

    #[tokio::test]
    async fn test_envelope_into_response() {
        let response = build_success(json!({"statusCode": 201, "data": 7})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.extensions().get::<Enveloped>().is_some());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            json!({"statusCode": 201, "message": "Request successful", "data": 7})
        );
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("123"), Some(123));
        assert_eq!(parse_leading_int("  +45x"), Some(45));
        assert_eq!(parse_leading_int("-7"), Some(-7));
        assert_eq!(parse_leading_int("x1"), None);
        assert_eq!(parse_leading_int("+"), None);
    }
}
