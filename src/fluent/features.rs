//! Security headers, the first thing every response passes on its way out.

use super::router::FluentRouter;
use crate::HttpMiddleware;

#[cfg(feature = "security-headers")]
use axum_helmet::{Helmet, HelmetLayer};

impl<State> FluentRouter<State>
where
    State: Clone + Send + Sync + 'static,
{
    /// Sets up security headers using Helmet.
    ///
    /// Adds, based on configuration:
    /// - `X-Content-Type-Options: nosniff`
    /// - `X-Frame-Options`
    ///
    /// ```toml
    /// [http]
    /// x_content_type_nosniff = true  # Default
    /// x_frame_options = "DENY"       # Default: DENY, SAMEORIGIN, or URL
    /// ```
    ///
    /// The layer sits outside the error boundary, so generic error envelopes
    /// carry the headers too.
    #[cfg(feature = "security-headers")]
    #[must_use]
    pub fn setup_helmet(mut self) -> Self {
        if !self.is_middleware_enabled(HttpMiddleware::SecurityHeaders) {
            return self;
        }

        let mut helmet = Helmet::new();
        if self.config.http.x_content_type_nosniff {
            helmet = helmet.add(helmet_core::XContentTypeOptions::nosniff());
        }
        let x_frame = match &self.config.http.x_frame_options.0 {
            crate::XFrameOptions::Deny => axum_helmet::XFrameOptions::Deny,
            crate::XFrameOptions::SameOrigin => axum_helmet::XFrameOptions::SameOrigin,
            crate::XFrameOptions::AllowFrom(url) => {
                axum_helmet::XFrameOptions::AllowFrom(url.clone())
            }
        };
        helmet = helmet.add(x_frame);
        self.inner = self.inner.layer(HelmetLayer::new(helmet));
        self
    }

    /// No-op when the `security-headers` feature is disabled.
    #[cfg(not(feature = "security-headers"))]
    #[must_use]
    pub fn setup_helmet(self) -> Self {
        if self.is_middleware_enabled(HttpMiddleware::SecurityHeaders) {
            tracing::debug!("Security headers requested but the `security-headers` feature is off");
        }
        self
    }
}
