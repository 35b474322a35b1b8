//! The request pipeline.
//!
//! Every request passes through a fixed, ordered list of [`Stage`]s before it
//! reaches the route table:
//!
//! | # | Stage | Module | May end the request |
//! |---|-------|--------|---------------------|
//! | 1 | body parsing | [`body`] | 413 when over the payload limit |
//! | 2 | admission control | [`admission`] | 429 when over the rate limit |
//! | 3 | access filter | [`access`] | 403 when the client is not allowed |
//! | 4 | timing | [`timing`] | no |
//! | 5 | not-found detection | [`not_found`] | escalates unmatched paths and methods |
//! | 6 | authentication | [`auth`] | when the authenticator refuses |
//! | 7 | RPC delegation | [`rpc`] | owns every request under the RPC prefix |
//!
//! Security headers run just outside the pipeline so that they also cover the
//! responses produced by the error boundary.
//!
//! Stages are driven by a [`Chain`]: a stage either returns a response of its
//! own or calls [`Chain::run`] to continue with the next stage. After the last
//! stage the chain calls the wrapped service, normally the router built by
//! [`RouteTable::into_router`](crate::RouteTable::into_router).
//!
//! ```rust
//! use axum::{Router, routing::get};
//! use axum_envelope::{HttpConfig, Pipeline};
//!
//! let pipeline = Pipeline::builder(&HttpConfig::default()).build().unwrap();
//! assert_eq!(
//!     pipeline.stage_names(),
//!     ["body", "admission", "access", "timing", "not_found", "auth", "rpc"]
//! );
//!
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(pipeline.layer());
//! ```

pub mod access;
pub mod admission;
pub mod auth;
pub mod body;
pub mod not_found;
pub mod rpc;
pub mod timing;

use crate::{
    AccessPolicy, AllowAll, Authenticator, BoxResponseFuture, HttpConfig, HttpMiddleware,
    Result, RpcHandler,
};

use {
    access::AccessFilter,
    admission::{Admission, MemoryRateStore, RateStore},
    auth::Authentication,
    axum::{extract::Request, response::Response},
    body::BodyParser,
    not_found::NotFound,
    rpc::RpcDelegation,
    std::{
        convert::Infallible,
        sync::Arc,
        task::{Context, Poll},
        time::Duration,
    },
    timing::Timing,
    tokio_util::task::AbortOnDropHandle,
    tower::{Layer, Service, ServiceExt, util::BoxCloneService},
};

/// One step of the pipeline.
pub trait Stage: Send + Sync + 'static {
    /// Short stable name, used in logs and by [`Pipeline::stage_names`].
    fn name(&self) -> &'static str;

    /// Handles a request, either answering it or passing it on with `next.run(req)`.
    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture;
}

type Endpoint = BoxCloneService<Request, Response, Infallible>;

/// The remainder of the pipeline from one stage onwards.
pub struct Chain {
    stages: Arc<[Arc<dyn Stage>]>,
    position: usize,
    endpoint: Endpoint,
}

impl Chain {
    /// Runs the next stage, or the wrapped service once every stage has run.
    pub fn run(mut self, req: Request) -> BoxResponseFuture {
        match self.stages.get(self.position).cloned() {
            Some(stage) => {
                self.position += 1;
                stage.handle(req, self)
            }
            None => Box::pin(async move {
                match self.endpoint.oneshot(req).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }),
        }
    }
}

/// Periodic eviction of expired rate windows.
#[derive(Clone)]
struct RateCleanup {
    store: Arc<dyn RateStore>,
    window: Duration,
    interval: Duration,
}

/// An assembled, immutable list of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    cleanup: Option<RateCleanup>,
}

impl Pipeline {
    /// Starts assembling the stages enabled by `config`.
    pub fn builder(config: &HttpConfig) -> PipelineBuilder {
        PipelineBuilder::new(config.clone())
    }

    /// Names of the installed stages, in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns a layer running the stages in front of the wrapped service.
    pub fn layer(&self) -> PipelineLayer {
        PipelineLayer {
            stages: self.stages.iter().cloned().collect(),
        }
    }

    /// Spawns the background task that evicts expired rate windows.
    ///
    /// Returns `None` when admission control is not installed. The task stops
    /// when the returned handle is dropped.
    pub fn spawn_cleanup(&self) -> Option<AbortOnDropHandle<()>> {
        let RateCleanup {
            store,
            window,
            interval,
        } = self.cleanup.clone()?;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired(window);
                tracing::debug!(evicted, "Evicted expired rate limit windows");
            }
        });
        Some(AbortOnDropHandle::new(handle))
    }

    pub(crate) fn push(&mut self, stage: impl Stage) {
        self.stages.push(Arc::new(stage));
    }
}

/// Assembles a [`Pipeline`] in the fixed stage order.
///
/// Stages switched off through `[http] include`/`exclude` are left out; the
/// relative order of the remaining ones never changes.
pub struct PipelineBuilder {
    config: HttpConfig,
    rate_store: Option<Arc<dyn RateStore>>,
    authenticator: Arc<dyn Authenticator>,
    rpc_handler: Option<Arc<dyn RpcHandler>>,
}

impl PipelineBuilder {
    fn new(config: HttpConfig) -> Self {
        Self {
            config,
            rate_store: None,
            authenticator: Arc::new(AllowAll),
            rpc_handler: None,
        }
    }

    /// Replaces the in-memory rate window store.
    #[must_use]
    pub fn with_rate_store(mut self, store: impl RateStore) -> Self {
        self.rate_store = Some(Arc::new(store));
        self
    }

    #[must_use]
    pub fn with_authenticator(mut self, authenticator: impl Authenticator) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    /// Sets the handler that owns requests under the RPC prefix.
    #[must_use]
    pub fn with_rpc_handler(mut self, handler: impl RpcHandler) -> Self {
        self.rpc_handler = Some(Arc::new(handler));
        self
    }

    pub(crate) fn with_shared_rpc_handler(mut self, handler: Option<Arc<dyn RpcHandler>>) -> Self {
        self.rpc_handler = handler;
        self
    }

    pub(crate) fn with_shared_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub(crate) fn with_shared_rate_store(mut self, store: Option<Arc<dyn RateStore>>) -> Self {
        self.rate_store = store;
        self
    }

    fn is_enabled(&self, middleware: HttpMiddleware) -> bool {
        self.config
            .middleware
            .as_ref()
            .is_none_or(|config| config.is_enabled(middleware))
    }

    /// Builds the pipeline.
    ///
    /// Fails when an access pattern does not compile, or when admission is
    /// enabled with a zero window or cleanup interval.
    pub fn build(self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::default();
        let http = &self.config;

        if self.is_enabled(HttpMiddleware::BodyParsing) {
            let limit = usize::try_from(http.max_payload_size_bytes.as_u64()).unwrap_or(usize::MAX);
            pipeline.push(BodyParser::new(limit));
        }

        if self.is_enabled(HttpMiddleware::RateLimiting) && http.rate_limit.is_enabled() {
            http.rate_limit.validate()?;
            let store = self
                .rate_store
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryRateStore::new()));
            pipeline.cleanup = Some(RateCleanup {
                store: store.clone(),
                window: http.rate_limit.window,
                interval: http.rate_limit.cleanup_interval,
            });
            pipeline.push(Admission::new(
                store,
                http.rate_limit.window,
                http.rate_limit.max_requests,
                http.trust_forwarded_for,
            ));
        }

        if self.is_enabled(HttpMiddleware::AccessFilter) {
            let policy = AccessPolicy::from_config(&http.access)?;
            pipeline.push(AccessFilter::new(policy, http.trust_forwarded_for));
        }

        if self.is_enabled(HttpMiddleware::Timing) {
            pipeline.push(Timing);
        }

        if self.is_enabled(HttpMiddleware::NotFound) {
            pipeline.push(NotFound);
        }

        if self.is_enabled(HttpMiddleware::Authentication) {
            pipeline.push(Authentication::new(self.authenticator.clone()));
        }

        if self.is_enabled(HttpMiddleware::Rpc) {
            pipeline.push(RpcDelegation::new(
                http.rpc_prefix.clone(),
                self.rpc_handler.clone(),
            ));
        }

        tracing::debug!(stages = ?pipeline.stage_names(), "Assembled request pipeline");
        Ok(pipeline)
    }
}

/// Layer produced by [`Pipeline::layer`].
#[derive(Clone)]
pub struct PipelineLayer {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl<S> Layer<S> for PipelineLayer {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            stages: self.stages.clone(),
        }
    }
}

/// Service produced by [`PipelineLayer`].
#[derive(Clone)]
pub struct PipelineService<S> {
    inner: S,
    stages: Arc<[Arc<dyn Stage>]>,
}

impl<S> Service<Request> for PipelineService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Response, Infallible>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        // The inner service is cloned and driven with `oneshot` per request.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let chain = Chain {
            stages: self.stages.clone(),
            position: 0,
            endpoint: BoxCloneService::new(self.inner.clone()),
        };
        Box::pin(async move { Ok(chain.run(req).await) })
    }
}
