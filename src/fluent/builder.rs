//! Orchestration and router delegation: setup_middleware(), start(), layer(), route(), etc.

use super::router::FluentRouter;
use super::shutdown::{ShutdownNotifier, ShutdownPhase};
use crate::Result;

use {
    axum::{Router, body::Body, routing::Route},
    http::Request,
    std::{convert::Infallible, net::SocketAddr, time::Duration},
    tokio::signal,
    tower::{Layer, Service},
};

impl<State> FluentRouter<State>
where
    State: Clone + Send + Sync + 'static,
{
    /// Sets up the request pipeline and everything around it in the correct
    /// order.
    ///
    /// # Middleware Order
    ///
    /// The **last layer added is the outermost layer** and executes **first**
    /// on incoming requests. From outermost to innermost:
    ///
    /// 1. **Request ID** - generate/keep `x-request-id`, copy it to the response
    /// 2. **Logging** - the `http_request` span
    /// 3. **Security headers** - applied to every response, error envelopes included
    /// 4. **Error boundary** - panics and escalations become generic envelopes
    /// 5. **Pipeline** - body, admission, access, timing, not_found, auth, rpc
    /// 6. **Routes** - the mounted route table and any `route()` additions
    ///
    /// Use `[http] exclude = [...]` to switch parts off rather than calling the
    /// `setup_*` methods selectively.
    ///
    /// # Errors
    ///
    /// See [`FluentRouter::setup_pipeline`].
    pub async fn setup_middleware(self) -> Result<Self> {
        const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");
        const VERSION: &str = env!("CARGO_PKG_VERSION");
        tracing::info!("Starting {PACKAGE_NAME} version {VERSION}...");

        let router = self
            .setup_pipeline()? // 5. Pipeline (innermost)
            .setup_error_boundary() // 4. Error boundary
            .setup_helmet() // 3. Security headers
            .setup_logging() // 2. Trace span
            .setup_request_id(); // 1. Request ID (outermost)

        tracing::debug!(stages = ?router.stage_names(), "Middleware installed");
        Ok(router)
    }

    /// Starts the HTTP server based on the current configuration.
    ///
    /// Connections are served with `ConnectInfo<SocketAddr>` so that admission
    /// control and the access filter see the peer address.
    ///
    /// # Graceful Shutdown
    ///
    /// On SIGTERM or SIGINT the server emits [`ShutdownPhase::Initiated`]
    /// (cancelling the [`cancellation_token`](FluentRouter::cancellation_token)),
    /// stops accepting connections, emits [`ShutdownPhase::GracePeriodStarted`]
    /// and waits for in-flight requests up to `shutdown_timeout`. If the
    /// timeout expires first, [`ShutdownPhase::GracePeriodEnded`] is emitted
    /// and the server stops anyway.
    pub async fn start(self) -> Result<()> {
        let bind_addr = self.config.http.full_bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("Bound to {}", &bind_addr);
        tracing::info!(
            stages = ?self.stage_names,
            max_requests = self.config.http.rate_limit.max_requests,
            window = %humantime::format_duration(self.config.http.rate_limit.window),
            "Waiting for connections"
        );

        // Keep the eviction task alive while serving.
        let _cleanup = self.cleanup_handle;
        let service = self
            .inner
            .with_state(self.state)
            .into_make_service_with_connect_info::<SocketAddr>();

        let shutdown_timeout = self.config.http.shutdown_timeout;
        let shutdown_notifier = self.shutdown_notifier.clone();
        let mut shutdown_rx = shutdown_notifier.subscribe();

        let serve_future = axum::serve(listener, service).with_graceful_shutdown(
            shutdown_signal_with_notifications(shutdown_timeout, shutdown_notifier.clone()),
        );

        // The timeout only starts once a shutdown signal has been received.
        tokio::select! {
            result = serve_future => {
                tracing::info!("Graceful shutdown completed");
                result?;
            }
            _ = async {
                loop {
                    match shutdown_rx.recv().await {
                        Ok(ShutdownPhase::Initiated) => break,
                        Ok(_) => continue,
                        Err(_) => return,
                    }
                }
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                tracing::warn!("Graceful shutdown timeout expired, forcing shutdown");
                shutdown_notifier.emit(ShutdownPhase::GracePeriodEnded);
            }
        }

        Ok(())
    }

    /// Adds a custom Tower middleware layer to the router.
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request<Body>> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request<Body>>>::Response: axum::response::IntoResponse + 'static,
        <L::Service as Service<Request<Body>>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request<Body>>>::Future: Send + 'static,
    {
        self.inner = self.inner.layer(layer);
        self
    }

    /// Adds an axum method router at `path`, next to the route table.
    ///
    /// Routes added after [`FluentRouter::setup_pipeline`] bypass the pipeline.
    #[must_use]
    pub fn route(mut self, path: &str, route: axum::routing::MethodRouter<State>) -> Self {
        self.inner = self.inner.route(path, route);
        self.mounted_paths.push(path.to_string());
        self
    }

    /// Nests another router at a specific path prefix.
    #[must_use]
    pub fn nest(mut self, path: &str, router: Router<State>) -> Self {
        self.inner = self.inner.nest(path, router);
        self
    }

    /// Merges another router into this one.
    ///
    /// The paths of a merged router are not known to the route table, so a
    /// registered route whose path differs from one of them only in parameter
    /// names makes axum panic in [`FluentRouter::setup_pipeline`]. Prefer
    /// [`FluentRouter::route`] or [`FluentRouter::register`].
    #[must_use]
    pub fn merge(mut self, other: Router<State>) -> Self {
        self.inner = self.inner.merge(other);
        self
    }

    /// Consumes the `FluentRouter` and returns the underlying `axum::Router`.
    ///
    /// The rate window eviction task is stopped; windows then only reset
    /// lazily, on the next request of the same client.
    pub fn into_inner(self) -> Router<State> {
        self.inner
    }
}

/// Waits for SIGTERM or SIGINT, then emits [`ShutdownPhase::Initiated`] and
/// [`ShutdownPhase::GracePeriodStarted`] and returns so that axum starts
/// draining.
///
/// If a signal handler cannot be installed, a warning is logged and that
/// signal is waited on forever.
pub(crate) async fn shutdown_signal_with_notifications(
    timeout: Duration,
    notifier: ShutdownNotifier,
) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::debug!("Ctrl+C signal received"),
            Err(err) => {
                tracing::warn!("Failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal_handler) => {
                signal_handler.recv().await;
                tracing::debug!("SIGTERM signal received");
            }
            Err(err) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        timeout.as_secs()
    );
    let subscriber_count = notifier.emit(ShutdownPhase::Initiated);
    tracing::debug!("Shutdown initiated notification sent to {subscriber_count} subscriber(s)");
    notifier.emit(ShutdownPhase::GracePeriodStarted { timeout });
}
