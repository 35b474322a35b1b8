//! Access filtering by client address.
//!
//! Patterns are globs over the textual address:
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*` | any run of characters within one segment (no `.` or `:`) |
//! | `**` | anything, across segments |
//! | `?` | exactly one character within a segment |
//! | `[0-3]`, `[15]` | one character from the class |
//! | `[!0-3]`, `[^0-3]` | one character not in the class |
//!
//! Patterns match the whole address. A client passes when the allow list is
//! empty or matches, and no deny pattern matches.

use super::{Chain, Stage};
use crate::{BoxResponseFuture, Error, HttpAccessConfig, Result, build_error, utils::client_identity};

use {
    axum::{extract::Request, response::IntoResponse},
    regex::Regex,
    serde_json::json,
};

/// Message of the 403 envelope.
pub const ACCESS_DENIED_MESSAGE: &str = "Access Denied!";

/// Compiled allow and deny patterns.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl AccessPolicy {
    /// Compiles the patterns of `[http.access]`.
    ///
    /// Fails with a configuration error on the first pattern that does not
    /// compile.
    pub fn from_config(config: &HttpAccessConfig) -> Result<Self> {
        Self::new(&config.allow, &config.deny)
    }

    pub fn new<A, D>(allow: &[A], deny: &[D]) -> Result<Self>
    where
        A: AsRef<str>,
        D: AsRef<str>,
    {
        Ok(Self {
            allow: allow
                .iter()
                .map(|p| glob_to_regex(p.as_ref()))
                .collect::<Result<_>>()?,
            deny: deny
                .iter()
                .map(|p| glob_to_regex(p.as_ref()))
                .collect::<Result<_>>()?,
        })
    }

    pub fn is_allowed(&self, address: &str) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(address));
        allowed && !self.deny.iter().any(|re| re.is_match(address))
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^.:]*"),
            '?' => out.push_str("[^.:]"),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '-' => out.push('-'),
                        other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                    }
                }
                if !closed {
                    return Err(Error::config(format!(
                        "Unclosed '[' in access pattern `{pattern}`"
                    )));
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    Ok(Regex::new(&out)?)
}

/// The access filter stage.
pub struct AccessFilter {
    policy: AccessPolicy,
    trust_forwarded_for: bool,
}

impl AccessFilter {
    pub fn new(policy: AccessPolicy, trust_forwarded_for: bool) -> Self {
        Self {
            policy,
            trust_forwarded_for,
        }
    }
}

impl Stage for AccessFilter {
    fn name(&self) -> &'static str {
        "access"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let address = client_identity(&req, self.trust_forwarded_for);
        if self.policy.is_allowed(&address) {
            return next.run(req);
        }

        tracing::warn!(address = %address, path = %req.uri().path(), "Access denied");
        Box::pin(async {
            build_error(json!({
                "statusCode": 403,
                "message": ACCESS_DENIED_MESSAGE,
            }))
            .into_response()
        })
    }
}
