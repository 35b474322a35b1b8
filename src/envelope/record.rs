//! Error records and the cause-chain inheritance rules of [`build_error`].

use super::{Envelope, as_text, field, first_present, sanitize_message, sanitize_status_code};

use {
    axum::response::{IntoResponse, Response},
    serde_json::{Map, Value, json},
    std::fmt,
};

/// Status code of an [`ErrorRecord`] that does not resolve one.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// A failure that serializes to an [`Envelope`].
///
/// Besides the envelope fields it carries `fatal` (do not recover locally),
/// `unhandled` (escaped normal handling) and the `cause` it was derived from.
/// None of these three are ever written to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub message: String,
    pub status_code: u16,
    pub status_message: Option<String>,
    pub data: Option<Value>,
    pub fatal: bool,
    pub unhandled: bool,
    pub cause: Option<Value>,
}

impl Default for ErrorRecord {
    fn default() -> Self {
        Self {
            message: String::new(),
            status_code: DEFAULT_ERROR_STATUS,
            status_message: None,
            data: None,
            fatal: false,
            unhandled: false,
            cause: None,
        }
    }
}

impl ErrorRecord {
    /// Creates a 500 record with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the status code, ignoring values outside `100..=999`.
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = sanitize_status_code(Some(&json!(status_code)), self.status_code);
        self
    }

    /// Attaches auxiliary data that is serialized with the envelope.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    #[must_use]
    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    #[must_use]
    pub fn with_unhandled(mut self, unhandled: bool) -> Self {
        self.unhandled = unhandled;
        self
    }

    /// Serializes the wire form: `{message, statusCode, data?}`.
    ///
    /// Status code and message are sanitized here, on every serialization,
    /// however the record was built.
    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            data: self.data.clone(),
            status_code: sanitize_status_code(Some(&json!(self.status_code)), DEFAULT_ERROR_STATUS),
            message: Some(sanitize_message(&self.message)),
        }
    }

    /// Returns every attribute, including the ones the envelope hides.
    ///
    /// This is the shape [`build_error`] reads when a record is nested as the
    /// `cause` of another input.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("message".into(), Value::String(self.message.clone()));
        map.insert("statusCode".into(), json!(self.status_code));
        if let Some(status_message) = &self.status_message {
            map.insert("statusMessage".into(), Value::String(status_message.clone()));
        }
        if let Some(data) = &self.data {
            map.insert("data".into(), data.clone());
        }
        map.insert("fatal".into(), Value::Bool(self.fatal));
        map.insert("unhandled".into(), Value::Bool(self.unhandled));
        if let Some(cause) = &self.cause {
            map.insert("cause".into(), cause.clone());
        }
        Value::Object(map)
    }

    /// Marks the record as escalated so the error boundary reports and renders it.
    pub fn escalate(self) -> Response {
        let mut response = self.to_envelope().into_response();
        response.extensions_mut().insert(Escalation(self));
        response
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorRecord {}

/// Response extension carrying a failure the error boundary must handle.
///
/// Stages and handlers do not render escalated failures themselves; they attach
/// the record and leave reporting and the public response to the boundary.
#[derive(Debug, Clone)]
pub struct Escalation(pub ErrorRecord);

impl IntoResponse for ErrorRecord {
    fn into_response(self) -> Response {
        if self.unhandled {
            return self.escalate();
        }

        tracing::debug!(
            status = self.status_code,
            message = %self.message,
            "Handled error"
        );
        self.to_envelope().into_response()
    }
}

/// Input accepted by [`build_error`].
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorInput {
    /// A bare message.
    Text(String),
    /// A structured object, possibly nesting its origin under `cause`.
    Object(Value),
    /// An already built record, returned unchanged.
    Record(ErrorRecord),
}

impl ErrorInput {
    /// Describes a native Rust error as an object input.
    ///
    /// An [`ErrorRecord`] (directly or as the first `source`) is recognised and
    /// its attributes become inheritable; any other source only contributes its
    /// message.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(record) = err.downcast_ref::<ErrorRecord>() {
            return ErrorInput::Record(record.clone());
        }

        let mut map = Map::new();
        map.insert("message".into(), Value::String(err.to_string()));
        if let Some(source) = err.source() {
            let cause = match source.downcast_ref::<ErrorRecord>() {
                Some(record) => record.to_value(),
                None => json!({ "message": source.to_string() }),
            };
            map.insert("cause".into(), cause);
        }
        ErrorInput::Object(Value::Object(map))
    }

    /// Wraps `cause` as the origin of a new, otherwise empty input.
    pub fn caused_by(cause: &ErrorRecord) -> Self {
        ErrorInput::Object(json!({ "cause": cause.to_value() }))
    }
}

impl From<&str> for ErrorInput {
    fn from(s: &str) -> Self {
        ErrorInput::Text(s.to_string())
    }
}

impl From<String> for ErrorInput {
    fn from(s: String) -> Self {
        ErrorInput::Text(s)
    }
}

impl From<Value> for ErrorInput {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ErrorInput::Text(s),
            other => ErrorInput::Object(other),
        }
    }
}

impl From<ErrorRecord> for ErrorInput {
    fn from(record: ErrorRecord) -> Self {
        ErrorInput::Record(record)
    }
}

impl From<Envelope> for ErrorInput {
    fn from(envelope: Envelope) -> Self {
        ErrorInput::Object(serde_json::to_value(envelope).unwrap_or(Value::Null))
    }
}

/// Builds an [`ErrorRecord`].
///
/// For object input the record's origin is `input.cause` when present, else
/// the input itself. Attributes resolve in this order, first present wins:
///
/// | Attribute | Precedence |
/// |-----------|------------|
/// | `message` | `input.message`, `input.statusMessage`, `""` |
/// | `statusCode` | `input.statusCode`, `input.status`, `cause.statusCode`, `cause.status` (numbers only) |
/// | `statusMessage` | `input.statusMessage`, `input.statusText`, `cause.statusMessage`, `cause.statusText` |
/// | `fatal`, `unhandled` | `input.<field>`, `cause.<field>` |
///
/// A resolved status message replaces `message`. Unresolved attributes keep
/// the record defaults (500, not fatal, handled).
///
/// ```rust
/// use axum_envelope::{build_error, ErrorInput};
/// use serde_json::json;
///
/// let cause = build_error(json!({ "statusCode": 400, "statusMessage": "Bad", "fatal": true }));
/// let outer = build_error(ErrorInput::caused_by(&cause));
/// assert!(outer.fatal);
/// assert_eq!(outer.status_code, 400);
/// ```
pub fn build_error(input: impl Into<ErrorInput>) -> ErrorRecord {
    let value = match input.into() {
        ErrorInput::Record(record) => return record,
        ErrorInput::Text(message) => return ErrorRecord::new(message),
        ErrorInput::Object(value) => value,
    };

    let cause = field(&value, "cause").cloned().unwrap_or_else(|| value.clone());

    let mut record = ErrorRecord {
        message: first_present(&value, &["message", "statusMessage"])
            .and_then(as_text)
            .unwrap_or_default(),
        data: field(&value, "data").cloned(),
        ..ErrorRecord::default()
    };

    let status = first_present(&value, &["statusCode", "status"])
        .or_else(|| first_present(&cause, &["statusCode", "status"]));
    if let Some(status) = status.filter(|v| v.is_number()) {
        record.status_code = sanitize_status_code(Some(status), record.status_code);
    }

    let status_message = first_present(&value, &["statusMessage", "statusText"])
        .or_else(|| first_present(&cause, &["statusMessage", "statusText"]))
        .and_then(as_text);
    if let Some(status_message) = status_message {
        record.message = status_message.clone();
        record.status_message = Some(status_message);
    }

    if let Some(fatal) = field(&value, "fatal").or_else(|| field(&cause, "fatal")) {
        record.fatal = truthy(fatal);
    }
    if let Some(unhandled) = field(&value, "unhandled").or_else(|| field(&cause, "unhandled")) {
        record.unhandled = truthy(unhandled);
    }

    record.cause = Some(cause);
    record
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
