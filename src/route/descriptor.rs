use {
    axum::{
        extract::Request,
        handler::Handler,
        middleware::Next,
        response::Response,
        routing::{MethodFilter, MethodRouter},
    },
    http::Method,
    std::{fmt, future::Future, pin::Pin, sync::Arc},
};

/// Boxed future returned by a [`RequestInterceptor`].
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// The six methods a route may be registered under.
pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
];

/// Maps an allowed method to the axum filter that mounts it.
///
/// Every allowed method has an entry; anything else yields `None`.
pub(crate) fn method_filter(method: &Method) -> Option<MethodFilter> {
    match *method {
        Method::GET => Some(MethodFilter::GET),
        Method::POST => Some(MethodFilter::POST),
        Method::PUT => Some(MethodFilter::PUT),
        Method::PATCH => Some(MethodFilter::PATCH),
        Method::DELETE => Some(MethodFilter::DELETE),
        Method::HEAD => Some(MethodFilter::HEAD),
        _ => None,
    }
}

/// A type-erased axum handler.
///
/// Any axum [`Handler`] can be wrapped; the handler is mounted under the
/// route's method when the table is turned into a router.
pub struct RequestHandler<S = ()> {
    mount: Arc<dyn Fn(MethodFilter) -> MethodRouter<S> + Send + Sync>,
}

impl<S> RequestHandler<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T, S> + Sync,
        T: 'static,
    {
        Self {
            mount: Arc::new(move |filter: MethodFilter| axum::routing::on(filter, handler.clone())),
        }
    }

    pub(crate) fn mount(&self, filter: MethodFilter) -> MethodRouter<S> {
        (self.mount)(filter)
    }
}

impl<S> Clone for RequestHandler<S> {
    fn clone(&self) -> Self {
        Self {
            mount: Arc::clone(&self.mount),
        }
    }
}

/// Per-route middleware: sees the request before the handler and the
/// response after it.
///
/// ```rust
/// use axum::{extract::Request, middleware::Next};
/// use axum_envelope::RequestInterceptor;
///
/// let tag = RequestInterceptor::new(|req: Request, next: Next| async move {
///     let mut response = next.run(req).await;
///     response.headers_mut().insert("x-route", "users".parse().unwrap());
///     response
/// });
/// ```
#[derive(Clone)]
pub struct RequestInterceptor {
    run: Arc<dyn Fn(Request, Next) -> BoxResponseFuture + Send + Sync>,
}

impl RequestInterceptor {
    pub fn new<F, Fut>(interceptor: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            run: Arc::new(move |req: Request, next: Next| -> BoxResponseFuture {
                Box::pin(interceptor(req, next))
            }),
        }
    }

    pub(crate) fn call(&self, req: Request, next: Next) -> BoxResponseFuture {
        (self.run)(req, next)
    }
}

impl fmt::Debug for RequestInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestInterceptor")
    }
}

/// A registered endpoint.
///
/// Fields are public so that malformed descriptors can be built and checked
/// with [`validate`](super::validate); [`RouteDescriptor::new`] always starts
/// with an empty (present) middleware list and no handler.
pub struct RouteDescriptor<S = ()> {
    pub name: String,
    pub path: String,
    pub method: Method,
    pub middleware: Option<Vec<RequestInterceptor>>,
    pub handler: Option<RequestHandler<S>>,
}

impl<S> RouteDescriptor<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, path: impl Into<String>, method: Method) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            method,
            middleware: Some(Vec::new()),
            handler: None,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, Method::GET)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, Method::POST)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, Method::PUT)
    }

    pub fn patch(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, Method::PATCH)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, Method::DELETE)
    }

    pub fn head(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, Method::HEAD)
    }

    /// Sets the handler.
    #[must_use]
    pub fn handler<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, S> + Sync,
        T: 'static,
    {
        self.handler = Some(RequestHandler::new(handler));
        self
    }

    /// Appends an interceptor. Interceptors run in the order they are added.
    #[must_use]
    pub fn intercept(mut self, interceptor: RequestInterceptor) -> Self {
        self.middleware.get_or_insert_with(Vec::new).push(interceptor);
        self
    }
}

impl<S> fmt::Debug for RouteDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("middleware", &self.middleware.as_ref().map(Vec::len))
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Rewrites `:param` and `*rest` segments to axum's `{param}` and `{*rest}`.
pub(crate) fn axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(param) = segment.strip_prefix(':')
                && !param.is_empty()
            {
                format!("{{{param}}}")
            } else if let Some(rest) = segment.strip_prefix('*')
                && !rest.is_empty()
            {
                format!("{{*{rest}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
