//!
//! Utility types and functions shared by the pipeline.
//!
//! This module provides:
//! - [`RequestIdGenerator`] - Generates or preserves request IDs for tracing
//! - [`replace_handlebars_with_env`] - Template substitution for environment variables
//! - [`client_ip`] / [`client_identity`] - Resolves who sent a request
//!

use {
    axum::extract::ConnectInfo,
    http::{HeaderValue, Request},
    regex::{Captures, Regex},
    std::{
        env,
        net::{IpAddr, SocketAddr},
        sync::LazyLock,
    },
    tower_http::request_id::{MakeRequestId, RequestId},
    uuid::{ContextV7, Timestamp, Uuid},
};

/// Identity used when a request carries no resolvable client address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Matches `{{ VAR_NAME }}` with optional whitespace around the variable name.
static HANDLEBAR_REGEXP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Z0-9_]+)\s*\}\}").unwrap());

/// Request ID generator that preserves an incoming `x-request-id` or creates a
/// new UUIDv7.
///
/// UUIDv7 ids are time-ordered, so log lines sort chronologically by id.
///
/// ```
/// use axum_envelope::RequestIdGenerator;
/// use tower_http::request_id::SetRequestIdLayer;
///
/// let layer = SetRequestIdLayer::x_request_id(RequestIdGenerator);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, req: &Request<B>) -> Option<RequestId> {
        match req.headers().get("x-request-id") {
            Some(value) => Some(RequestId::new(value.clone())),
            None => {
                let cx = ContextV7::new().with_additional_precision();
                let uuid = Uuid::new_v7(Timestamp::now(cx));
                let value = HeaderValue::from_str(&uuid.to_string()).ok()?;
                Some(RequestId::new(value))
            }
        }
    }
}

/// Replaces handlebars-style placeholders with environment variable values.
///
/// Variable names are case-sensitive and must consist of uppercase letters,
/// digits, or underscores. Missing variables become empty strings.
///
/// ```
/// use axum_envelope::replace_handlebars_with_env;
///
/// let result = replace_handlebars_with_env("Value: {{ MISSING_VAR }}");
/// assert_eq!(result, "Value: ");
/// ```
pub fn replace_handlebars_with_env(input: &str) -> String {
    HANDLEBAR_REGEXP
        .replace_all(input, |caps: &Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(
                    variable = %var_name,
                    "Environment variable not found, substituting with empty string"
                );
                String::new()
            })
        })
        .to_string()
}

/// Resolves the client address of a request.
///
/// With `trust_forwarded_for`, the first parseable `X-Forwarded-For` hop wins;
/// otherwise (or when the header is absent or garbled) the connection peer
/// from `ConnectInfo` is used. IPv4-mapped IPv6 addresses are reported as IPv4.
pub fn client_ip<B>(req: &Request<B>, trust_forwarded_for: bool) -> Option<IpAddr> {
    let forwarded = trust_forwarded_for
        .then(|| forwarded_for(req))
        .flatten();

    forwarded
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .map(|ip| ip.to_canonical())
}

/// The client address as a string key, or [`UNKNOWN_CLIENT`].
pub fn client_identity<B>(req: &Request<B>, trust_forwarded_for: bool) -> String {
    client_ip(req, trust_forwarded_for)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_for<B>(req: &Request<B>) -> Option<IpAddr> {
    req.headers()
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
