//! Static route table.
//!
//! Routes are described once at startup as [`RouteDescriptor`]s, collected in a
//! [`RouteTable`] and mounted into an `axum::Router`. The table is read-only
//! once it has been turned into a router.
//!
//! ```rust
//! use axum_envelope::{RouteDescriptor, RouteTable, build_success};
//!
//! async fn list_users() -> axum_envelope::Envelope {
//!     build_success(serde_json::json!({ "data": [] }))
//! }
//!
//! let mut table: RouteTable = RouteTable::new();
//! table
//!     .register(RouteDescriptor::get("listUsers", "/users").handler(list_users))
//!     .unwrap();
//!
//! assert!(table.lookup("LISTUSERS").is_some());
//! let router: axum::Router = table.into_router().unwrap();
//! ```

mod descriptor;

pub use descriptor::{
    ALLOWED_METHODS, BoxResponseFuture, RequestHandler, RequestInterceptor, RouteDescriptor,
};

use {
    axum::{Router, extract::Request, middleware::Next, routing::MethodRouter},
    descriptor::{axum_path, method_filter},
    http::Method,
    std::collections::{HashMap, HashSet},
    thiserror::Error,
};

/// Structural problems with a route or the table as a whole.
///
/// These are construction-time failures; they are never rendered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RouteError {
    #[error("Router is empty")]
    Empty,

    #[error("Router name must be a non-empty string")]
    EmptyName,

    #[error("Router path must be a non-empty string")]
    EmptyPath,

    #[error("Router method must be one of GET, POST, PUT, PATCH, DELETE, HEAD")]
    InvalidMethod,

    #[error("Router middleware must be a list")]
    MiddlewareNotList,

    #[error("Router handler must be a function")]
    HandlerNotCallable,

    #[error("Router name '{0}' is already registered")]
    DuplicateName(String),

    #[error("Router path '{0}' must begin with '/'")]
    RelativePath(String),

    #[error("Route {method} {path} is already registered")]
    DuplicateRoute { method: Method, path: String },

    #[error("Route path '{path}' conflicts with '{existing}'")]
    ConflictingPath { path: String, existing: String },
}

/// Checks a descriptor's structural integrity.
///
/// Checks run in a fixed order and stop at the first failure: presence, name,
/// path, method, middleware, handler.
pub fn validate<S>(route: Option<&RouteDescriptor<S>>) -> Result<(), RouteError> {
    let Some(route) = route else {
        return Err(RouteError::Empty);
    };

    if route.name.is_empty() {
        return Err(RouteError::EmptyName);
    }
    if route.path.is_empty() {
        return Err(RouteError::EmptyPath);
    }
    if !ALLOWED_METHODS.contains(&route.method) {
        return Err(RouteError::InvalidMethod);
    }
    if route.middleware.is_none() {
        return Err(RouteError::MiddlewareNotList);
    }
    if route.handler.is_none() {
        return Err(RouteError::HandlerNotCallable);
    }
    Ok(())
}

/// An ordered, append-only list of routes.
pub struct RouteTable<S = ()> {
    routes: Vec<RouteDescriptor<S>>,
}

impl<S> Default for RouteTable<S> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<S> RouteTable<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route.
    ///
    /// Names are unique ignoring ASCII case; a second registration under a
    /// taken name is rejected. The descriptor is not otherwise validated here.
    pub fn register(&mut self, route: RouteDescriptor<S>) -> Result<&mut Self, RouteError> {
        if self.lookup(&route.name).is_some() {
            return Err(RouteError::DuplicateName(route.name));
        }
        self.routes.push(route);
        Ok(self)
    }

    /// Finds a route by name, ignoring ASCII case.
    pub fn lookup(&self, name: &str) -> Option<&RouteDescriptor<S>> {
        self.routes
            .iter()
            .find(|route| route.name.eq_ignore_ascii_case(name))
    }

    /// See [`validate`].
    pub fn validate(route: Option<&RouteDescriptor<S>>) -> Result<(), RouteError> {
        validate(route)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor<S>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Mounts every route into an `axum::Router`.
    ///
    /// Each descriptor is validated first. Routes sharing a path are merged
    /// into one method router; the same method registered twice on one path
    /// is an error. A route's interceptors wrap only that route, the first
    /// listed running outermost.
    pub fn into_router(self) -> Result<Router<S>, RouteError> {
        self.into_router_alongside(&[])
    }

    /// Like [`RouteTable::into_router`], for a router that already serves
    /// `mounted` (axum-style paths).
    ///
    /// Paths that differ only in parameter names cannot live in one router;
    /// such a pair is reported as [`RouteError::ConflictingPath`].
    pub fn into_router_alongside(self, mounted: &[String]) -> Result<Router<S>, RouteError> {
        let mut shapes: HashMap<String, String> = mounted
            .iter()
            .map(|path| (path_shape(path), path.clone()))
            .collect();
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut by_path: HashMap<String, MethodRouter<S>> = HashMap::new();

        for route in self.routes {
            validate(Some(&route))?;
            if !route.path.starts_with('/') {
                return Err(RouteError::RelativePath(route.path));
            }

            let path = axum_path(&route.path);
            match shapes.get(&path_shape(&path)) {
                Some(existing) if *existing != path => {
                    return Err(RouteError::ConflictingPath {
                        path: route.path,
                        existing: existing.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    shapes.insert(path_shape(&path), path.clone());
                }
            }
            if !seen.insert((path.clone(), route.method.clone())) {
                return Err(RouteError::DuplicateRoute {
                    method: route.method,
                    path: route.path,
                });
            }

            let Some(filter) = method_filter(&route.method) else {
                return Err(RouteError::InvalidMethod);
            };
            let Some(handler) = route.handler else {
                return Err(RouteError::HandlerNotCallable);
            };

            let mut method_router = handler.mount(filter);
            for interceptor in route.middleware.unwrap_or_default().into_iter().rev() {
                method_router = method_router.layer(axum::middleware::from_fn(
                    move |req: Request, next: Next| interceptor.call(req, next),
                ));
            }

            tracing::debug!(name = %route.name, method = %route.method, %path, "Mounted route");

            match by_path.remove(&path) {
                Some(existing) => {
                    by_path.insert(path, existing.merge(method_router));
                }
                None => {
                    order.push(path.clone());
                    by_path.insert(path, method_router);
                }
            }
        }

        let mut router = Router::new();
        for path in order {
            if let Some(method_router) = by_path.remove(&path) {
                router = router.route(&path, method_router);
            }
        }
        Ok(router)
    }
}

/// `path` with every parameter name erased: `/users/{id}` becomes `/users/{}`.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !(segment.starts_with('{') && segment.ends_with('}')) {
                segment
            } else if segment.starts_with("{*") {
                "{*}"
            } else {
                "{}"
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Path, http::StatusCode};
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    async fn ok() -> &'static str {
        "ok"
    }

    fn valid() -> RouteDescriptor {
        RouteDescriptor::get("users", "/users").handler(ok)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // ========================================================================
    // validate
    // ========================================================================

    #[test]
    fn test_validate_accepts_complete_descriptor() {
        assert_eq!(validate(Some(&valid())), Ok(()));
    }

    #[test]
    fn test_validate_none_is_empty() {
        let err = validate::<()>(None).unwrap_err();
        assert_eq!(err, RouteError::Empty);
        assert_eq!(err.to_string(), "Router is empty");
    }

    #[test]
    fn test_validate_empty_name() {
        let mut route = valid();
        route.name.clear();
        assert_eq!(validate(Some(&route)), Err(RouteError::EmptyName));
    }

    #[test]
    fn test_validate_empty_path() {
        let mut route = valid();
        route.path.clear();
        assert_eq!(validate(Some(&route)), Err(RouteError::EmptyPath));
    }

    #[test]
    fn test_validate_method_outside_allowed_set() {
        let mut route = valid();
        route.method = Method::OPTIONS;
        let err = validate(Some(&route)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Router method must be one of GET, POST, PUT, PATCH, DELETE, HEAD"
        );
    }

    #[test]
    fn test_validate_missing_middleware_list() {
        let mut route = valid();
        route.middleware = None;
        assert_eq!(validate(Some(&route)), Err(RouteError::MiddlewareNotList));
    }

    #[test]
    fn test_validate_missing_handler() {
        let route: RouteDescriptor = RouteDescriptor::get("users", "/users");
        let err = validate(Some(&route)).unwrap_err();
        assert_eq!(err.to_string(), "Router handler must be a function");
    }

    #[test]
    fn test_validate_reports_first_failure_only() {
        let mut route: RouteDescriptor = RouteDescriptor::new("", "", Method::TRACE);
        route.middleware = None;
        assert_eq!(validate(Some(&route)), Err(RouteError::EmptyName));

        route.name = "x".into();
        assert_eq!(validate(Some(&route)), Err(RouteError::EmptyPath));

        route.path = "/x".into();
        assert_eq!(validate(Some(&route)), Err(RouteError::InvalidMethod));

        route.method = Method::GET;
        assert_eq!(validate(Some(&route)), Err(RouteError::MiddlewareNotList));

        route.middleware = Some(Vec::new());
        assert_eq!(validate(Some(&route)), Err(RouteError::HandlerNotCallable));
    }

    #[test]
    fn test_validate_all_allowed_methods() {
        for method in ALLOWED_METHODS {
            let route: RouteDescriptor = RouteDescriptor::new("r", "/r", method).handler(ok);
            assert_eq!(validate(Some(&route)), Ok(()));
        }
    }

    // ========================================================================
    // register / lookup
    // ========================================================================

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut table: RouteTable = RouteTable::new();
        table.register(valid()).unwrap();
        assert!(table.lookup("users").is_some());
        assert!(table.lookup("USERS").is_some());
        assert!(table.lookup("Users").is_some());
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let table: RouteTable = RouteTable::new();
        assert!(table.lookup("missing").is_none());
    }

    #[test]
    fn test_register_rejects_duplicate_name() {
        let mut table: RouteTable = RouteTable::new();
        table.register(valid()).unwrap();
        let err = table
            .register(RouteDescriptor::post("USERS", "/other").handler(ok))
            .err()
            .unwrap();
        assert_eq!(err, RouteError::DuplicateName("USERS".into()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_register_does_not_validate() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("incomplete", "/incomplete"))
            .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_register_preserves_order() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("a", "/a").handler(ok))
            .unwrap()
            .register(RouteDescriptor::get("b", "/b").handler(ok))
            .unwrap();
        let names: Vec<_> = table.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    // ========================================================================
    // into_router
    // ========================================================================

    #[test]
    fn test_into_router_rejects_invalid_descriptor() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("incomplete", "/incomplete"))
            .unwrap();
        assert_eq!(
            table.into_router().err(),
            Some(RouteError::HandlerNotCallable)
        );
    }

    #[test]
    fn test_into_router_rejects_relative_path() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("rel", "users").handler(ok))
            .unwrap();
        assert_eq!(
            table.into_router().err(),
            Some(RouteError::RelativePath("users".into()))
        );
    }

    #[test]
    fn test_into_router_rejects_duplicate_method_and_path() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("a", "/users/:id").handler(ok))
            .unwrap()
            .register(RouteDescriptor::get("b", "/users/{id}").handler(ok))
            .unwrap();
        assert!(matches!(
            table.into_router().err(),
            Some(RouteError::DuplicateRoute { .. })
        ));
    }

    #[test]
    fn test_into_router_rejects_params_differing_only_in_name() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("show", "/users/:id").handler(ok))
            .unwrap()
            .register(RouteDescriptor::delete("remove", "/users/:name").handler(ok))
            .unwrap();
        assert_eq!(
            table.into_router().err(),
            Some(RouteError::ConflictingPath {
                path: "/users/:name".into(),
                existing: "/users/{id}".into(),
            })
        );
    }

    #[test]
    fn test_into_router_rejects_catch_alls_differing_only_in_name() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("a", "/files/*rest").handler(ok))
            .unwrap()
            .register(RouteDescriptor::post("b", "/files/*path").handler(ok))
            .unwrap();
        assert!(matches!(
            table.into_router().err(),
            Some(RouteError::ConflictingPath { .. })
        ));
    }

    #[test]
    fn test_into_router_alongside_checks_mounted_paths() {
        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::delete("remove", "/users/:name").handler(ok))
            .unwrap();
        let err = table
            .into_router_alongside(&["/users/{id}".to_string()])
            .err();
        assert!(matches!(err, Some(RouteError::ConflictingPath { .. })));

        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::delete("remove", "/users/:id").handler(ok))
            .unwrap();
        assert!(table.into_router_alongside(&["/users/{id}".to_string()]).is_ok());
    }

    #[test]
    fn test_path_shape_erases_parameter_names() {
        assert_eq!(path_shape("/users/{id}"), "/users/{}");
        assert_eq!(path_shape("/files/{*rest}"), "/files/{*}");
        assert_eq!(path_shape("/users/me"), "/users/me");
    }

    #[tokio::test]
    async fn test_into_router_dispatches_by_method() {
        async fn create() -> (StatusCode, &'static str) {
            (StatusCode::CREATED, "created")
        }

        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("list", "/users").handler(ok))
            .unwrap()
            .register(RouteDescriptor::post("create", "/users").handler(create))
            .unwrap();
        let router = table.into_router().unwrap();

        let response = router
            .clone()
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(Request::post("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(Request::delete("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_into_router_supports_patch_and_head() {
        async fn patched() -> &'static str {
            "patched"
        }

        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::patch("patch", "/item").handler(patched))
            .unwrap()
            .register(RouteDescriptor::head("head", "/item").handler(ok))
            .unwrap();
        let router = table.into_router().unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::PATCH)
                    .uri("/item")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "patched");

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::HEAD)
                    .uri("/item")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_into_router_rewrites_colon_params() {
        async fn show(Path(id): Path<String>) -> String {
            format!("user {id}")
        }

        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("show", "/users/:id").handler(show))
            .unwrap();
        let router = table.into_router().unwrap();

        let response = router
            .oneshot(Request::get("/users/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "user 42");
    }

    #[tokio::test]
    async fn test_interceptors_wrap_only_their_route_first_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let tracer = |label: &'static str, log: Arc<Mutex<Vec<String>>>| {
            RequestInterceptor::new(move |req: Request, next: Next| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{label}:in"));
                    let response = next.run(req).await;
                    log.lock().unwrap().push(format!("{label}:out"));
                    response
                }
            })
        };

        let mut table: RouteTable = RouteTable::new();
        table
            .register(
                RouteDescriptor::get("wrapped", "/wrapped")
                    .intercept(tracer("first", log.clone()))
                    .intercept(tracer("second", log.clone()))
                    .handler(ok),
            )
            .unwrap()
            .register(RouteDescriptor::get("bare", "/bare").handler(ok))
            .unwrap();
        let router = table.into_router().unwrap();

        router
            .clone()
            .oneshot(Request::get("/wrapped").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["first:in", "second:in", "second:out", "first:out"]
        );

        log.lock().unwrap().clear();
        router
            .oneshot(Request::get("/bare").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interceptor_can_short_circuit() {
        use axum::response::IntoResponse;

        let deny = RequestInterceptor::new(|_req: Request, _next: Next| async {
            crate::build_error(serde_json::json!({"statusCode": 401, "message": "nope"}))
                .into_response()
        });

        let mut table: RouteTable = RouteTable::new();
        table
            .register(RouteDescriptor::get("secret", "/secret").intercept(deny).handler(ok))
            .unwrap();
        let router = table.into_router().unwrap();

        let response = router
            .oneshot(Request::get("/secret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
