use {
    crate::{AccessPolicy, Result},
    serde::Deserialize,
};

/// Allow/deny patterns evaluated against the client address.
///
/// Patterns are globs: `*` matches within one dotted/colon segment, `**` across
/// segments, `?` one character, and `[0-3]` a character class.
///
/// ```toml
/// [http.access]
/// allow = ["127.0.0.1", "10.0.*.*"]
/// deny = ["10.0.13.*"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpAccessConfig {
    /// When non-empty, only matching addresses pass.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Matching addresses are rejected, even when allowed.
    #[serde(default)]
    pub deny: Vec<String>,
}

impl HttpAccessConfig {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    /// Compiles the patterns, so a malformed one fails at startup.
    pub fn validate(&self) -> Result<()> {
        AccessPolicy::from_config(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_default_is_empty_and_valid() {
        let config = HttpAccessConfig::default();
        assert!(config.allow.is_empty());
        assert!(config.deny.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unclosed_class_is_a_configuration_error() {
        let config = HttpAccessConfig::new(vec!["10.0.0.[1-".into()], vec![]);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
