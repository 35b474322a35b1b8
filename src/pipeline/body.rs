//! Body parsing.
//!
//! Buffers the request body up to the configured payload limit, makes a parsed
//! copy available as a [`ParsedBody`] extension and hands the original bytes on
//! to the handler. Content that does not parse as its declared type is kept as
//! raw bytes; only an oversized body ends the request (413).

use super::{Chain, Stage};
use crate::{BoxResponseFuture, build_error};

use {
    axum::{
        body::{Body, Bytes},
        extract::{FromRequestParts, Request},
        http::{HeaderMap, header, request::Parts},
        response::{IntoResponse, Response},
    },
    serde_json::{Value, json},
    std::convert::Infallible,
};

/// The request body as seen by the body parsing stage.
///
/// Also usable as an extractor; it yields [`ParsedBody::Empty`] when the stage
/// is disabled.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParsedBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ParsedBody {
    fn parse(headers: &HeaderMap, bytes: &Bytes) -> Self {
        if bytes.is_empty() {
            return ParsedBody::Empty;
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|mime| mime.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if content_type == "application/json" || content_type.ends_with("+json") {
            serde_json::from_slice(bytes)
                .map(ParsedBody::Json)
                .unwrap_or_else(|_| ParsedBody::Bytes(bytes.clone()))
        } else if content_type.starts_with("text/")
            || content_type == "application/x-www-form-urlencoded"
        {
            std::str::from_utf8(bytes)
                .map(|text| ParsedBody::Text(text.to_string()))
                .unwrap_or_else(|_| ParsedBody::Bytes(bytes.clone()))
        } else {
            ParsedBody::Bytes(bytes.clone())
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParsedBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl<S> FromRequestParts<S> for ParsedBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<ParsedBody>().cloned().unwrap_or_default())
    }
}

/// The body parsing stage.
#[derive(Debug, Clone, Copy)]
pub struct BodyParser {
    limit: usize,
}

impl BodyParser {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Stage for BodyParser {
    fn name(&self) -> &'static str {
        "body"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let limit = self.limit;
        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let declared = parts
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            if declared.is_some_and(|len| len > limit as u64) {
                return payload_too_large(limit);
            }

            let bytes = match axum::body::to_bytes(body, limit).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(limit, "Request body rejected: {err}");
                    return payload_too_large(limit);
                }
            };

            parts
                .extensions
                .insert(ParsedBody::parse(&parts.headers, &bytes));
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        })
    }
}

fn payload_too_large(limit: usize) -> Response {
    build_error(json!({
        "statusCode": 413,
        "message": "Payload Too Large",
        "data": { "limit": limit },
    }))
    .into_response()
}
