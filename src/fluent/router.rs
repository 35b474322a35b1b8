//! Core FluentRouter struct, collaborators and route registration.

use {
    super::shutdown::{ShutdownNotifier, ShutdownPhase},
    crate::{
        AllowAll, Authenticator, Config, CrashReporter, HttpMiddleware, Result, RouteDescriptor,
        RouteTable, RpcHandler, TracingReporter, pipeline::admission::RateStore,
    },
    axum::Router,
    std::sync::Arc,
    tokio::sync::broadcast,
    tokio_util::{sync::CancellationToken, task::AbortOnDropHandle},
};

/// Fluent builder for `axum::Router` with a configuration-driven request
/// pipeline and error boundary.
///
/// Routes are added either as [`RouteDescriptor`]s through
/// [`FluentRouter::register`] or directly as axum method routers through
/// [`FluentRouter::route`]. Collaborators (crash reporter, authenticator, RPC
/// handler, rate store) are set with the `with_*` methods before calling
/// [`FluentRouter::setup_middleware`].
///
/// ```rust,no_run
/// use axum_envelope::{Config, FluentRouter, RouteDescriptor, build_success};
///
/// # async fn example() -> axum_envelope::Result<()> {
/// FluentRouter::without_state(Config::default())?
///     .register(RouteDescriptor::get("hello", "/").handler(|| async {
///         build_success("Hello, World!")
///     }))?
///     .setup_middleware()
///     .await?
///     .start()
///     .await
/// # }
/// ```
pub struct FluentRouter<State = ()> {
    pub(crate) config: Config,
    pub(crate) state: State,
    pub(crate) inner: Router<State>,
    pub(crate) routes: RouteTable<State>,
    pub(crate) mounted_paths: Vec<String>,
    pub(crate) reporter: Arc<dyn CrashReporter>,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) rpc_handler: Option<Arc<dyn RpcHandler>>,
    pub(crate) rate_store: Option<Arc<dyn RateStore>>,
    pub(crate) stage_names: Vec<&'static str>,
    pub(crate) cleanup_handle: Option<AbortOnDropHandle<()>>,
    pub(crate) shutdown_notifier: ShutdownNotifier,
}

impl FluentRouter {
    /// Creates a new `FluentRouter` without application state.
    pub fn without_state(config: Config) -> Result<FluentRouter<()>> {
        FluentRouter::<()>::with_state(config, ())
    }
}

impl<State> FluentRouter<State>
where
    State: Clone + Send + Sync + 'static,
{
    /// Creates a new `FluentRouter` with the provided configuration and state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if [`Config::validate`] fails, for example
    /// because an access pattern does not compile.
    pub fn with_state<S: Clone + Send + Sync + 'static>(
        config: Config,
        state: S,
    ) -> Result<FluentRouter<S>> {
        config.validate()?;

        Ok(FluentRouter {
            config,
            state,
            inner: Router::new(),
            routes: RouteTable::new(),
            mounted_paths: Vec::new(),
            reporter: Arc::new(TracingReporter),
            authenticator: Arc::new(AllowAll),
            rpc_handler: None,
            rate_store: None,
            stage_names: Vec::new(),
            cleanup_handle: None,
            shutdown_notifier: ShutdownNotifier::default(),
        })
    }

    /// The configuration this router was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sets the sink for failures caught by the error boundary.
    ///
    /// Defaults to [`TracingReporter`].
    #[must_use]
    pub fn with_crash_reporter(mut self, reporter: impl CrashReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Sets the authenticator consulted by the authentication stage.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: impl Authenticator) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    /// Sets the handler that owns every request under `[http] rpc_prefix`.
    #[must_use]
    pub fn with_rpc_handler(mut self, handler: impl RpcHandler) -> Self {
        self.rpc_handler = Some(Arc::new(handler));
        self
    }

    /// Replaces the in-memory rate window store, e.g. with one shared
    /// between instances.
    #[must_use]
    pub fn with_rate_store(mut self, store: impl RateStore) -> Self {
        self.rate_store = Some(Arc::new(store));
        self
    }

    /// Adds a route to the route table.
    ///
    /// The table is mounted by [`FluentRouter::setup_pipeline`].
    ///
    /// # Errors
    ///
    /// Fails when a route with the same name (ignoring case) is already
    /// registered.
    pub fn register(mut self, route: RouteDescriptor<State>) -> Result<Self> {
        self.routes.register(route)?;
        Ok(self)
    }

    /// The routes registered so far and not yet mounted.
    pub fn routes(&self) -> &RouteTable<State> {
        &self.routes
    }

    /// Names of the installed pipeline stages, in execution order.
    ///
    /// Empty until [`FluentRouter::setup_pipeline`] has run.
    pub fn stage_names(&self) -> &[&'static str] {
        &self.stage_names
    }

    /// Returns a reference to the shutdown notifier.
    #[must_use]
    pub fn shutdown_notifier(&self) -> &ShutdownNotifier {
        &self.shutdown_notifier
    }

    /// Returns a token that is cancelled when shutdown begins.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_notifier.cancellation_token()
    }

    /// Returns a new receiver for shutdown phase notifications.
    #[must_use]
    pub fn subscribe_to_shutdown(&self) -> broadcast::Receiver<ShutdownPhase> {
        self.shutdown_notifier.subscribe()
    }

    /// Returns true if no middleware config is specified (all enabled by
    /// default), or if the middleware is explicitly enabled/not excluded.
    pub(crate) fn is_middleware_enabled(&self, middleware: HttpMiddleware) -> bool {
        self.config
            .http
            .middleware
            .as_ref()
            .is_none_or(|config| config.is_enabled(middleware))
    }
}
