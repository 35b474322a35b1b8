//! Request handling: the pipeline itself and request ids.

use super::router::FluentRouter;
use crate::{HttpMiddleware, Pipeline, Result};

use {
    crate::utils::RequestIdGenerator,
    axum::extract::DefaultBodyLimit,
    tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
};

impl<State> FluentRouter<State>
where
    State: Clone + Send + Sync + 'static,
{
    /// Mounts the route table and wraps everything in the request pipeline.
    ///
    /// Registered [`RouteDescriptor`](crate::RouteDescriptor)s are turned into
    /// routes first, so the pipeline covers them as well as routes added with
    /// [`FluentRouter::route`] and the fallback. Starts the background task
    /// that evicts expired rate windows; it stops when the router is dropped.
    ///
    /// # Errors
    ///
    /// Fails when a registered route does not validate, two routes share a
    /// method and path, a registered path differs from another registered
    /// one or one added with [`FluentRouter::route`] only in parameter names,
    /// or an access pattern does not compile.
    pub fn setup_pipeline(mut self) -> Result<Self> {
        let routes = std::mem::take(&mut self.routes);
        if !routes.is_empty() {
            let table = routes.into_router_alongside(&self.mounted_paths)?;
            self.inner = self.inner.merge(table);
        }

        let pipeline = Pipeline::builder(&self.config.http)
            .with_shared_authenticator(self.authenticator.clone())
            .with_shared_rpc_handler(self.rpc_handler.clone())
            .with_shared_rate_store(self.rate_store.clone())
            .build()?;

        if self.is_middleware_enabled(HttpMiddleware::BodyParsing) {
            // Extractors must accept what the body stage let through.
            let limit = usize::try_from(self.config.http.max_payload_size_bytes.as_u64())
                .unwrap_or(usize::MAX);
            self.inner = self.inner.layer(DefaultBodyLimit::max(limit));
        }

        self.stage_names = pipeline.stage_names();
        self.cleanup_handle = pipeline.spawn_cleanup();
        self.inner = self.inner.layer(pipeline.layer());
        Ok(self)
    }

    /// Sets up request ID generation and propagation.
    ///
    /// An incoming `x-request-id` is kept, otherwise a UUIDv7 is generated.
    /// The id is copied onto the response.
    #[must_use]
    pub fn setup_request_id(mut self) -> Self {
        if !self.is_middleware_enabled(HttpMiddleware::RequestId) {
            return self;
        }

        // Set must wrap Propagate so the generated id exists when it is copied.
        self.inner = self
            .inner
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(RequestIdGenerator));
        self
    }
}
