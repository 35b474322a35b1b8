use crate::{Error, Result};
use serde::Deserialize;

/// Selects which middleware run.
///
/// ```toml
/// [http]
/// exclude = ["rate-limiting", "timing"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMiddlewareConfig {
    Include(Vec<HttpMiddleware>),
    Exclude(Vec<HttpMiddleware>),
}

impl HttpMiddlewareConfig {
    pub fn is_enabled(&self, middleware: HttpMiddleware) -> bool {
        match self {
            HttpMiddlewareConfig::Include(list) => list.contains(&middleware),
            HttpMiddlewareConfig::Exclude(list) => !list.contains(&middleware),
        }
    }

    /// Validates middleware dependencies are satisfied.
    ///
    /// # Dependencies
    ///
    /// - `NotFound` requires `ErrorBoundary` (its escalations must be caught)
    pub fn validate(&self) -> Result<()> {
        if self.is_enabled(HttpMiddleware::NotFound)
            && !self.is_enabled(HttpMiddleware::ErrorBoundary)
        {
            return Err(Error::invalid_input(
                "NotFound requires ErrorBoundary. Remove 'error-boundary' from Exclude list or add both to Include list.",
            ));
        }
        Ok(())
    }
}

/// Every switchable middleware, pipeline stages included.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum HttpMiddleware {
    ErrorBoundary,
    RequestId,
    Logging,
    SecurityHeaders,
    BodyParsing,
    RateLimiting,
    AccessFilter,
    Timing,
    NotFound,
    Authentication,
    Rpc,
}
