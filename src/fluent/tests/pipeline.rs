//! The pipeline stages as seen through a fully assembled router.

use super::*;
use crate::{
    AuthFuture, Authenticator, FluentRouter, ParsedBody, RouteDescriptor, build_error,
    build_success,
};

use {
    axum::{Router, response::IntoResponse, routing::get},
    http::StatusCode,
    serde_json::json,
    tower::ServiceExt,
};

async fn hello() -> crate::Envelope {
    build_success(json!({ "data": { "greeting": "hello" } }))
}

async fn app_with(config: Config) -> Router {
    FluentRouter::without_state(config)
        .unwrap()
        .register(RouteDescriptor::get("hello", "/hello").handler(hello))
        .unwrap()
        .setup_middleware()
        .await
        .unwrap()
        .into_inner()
}

// ============================================================================
// Stage order and selection
// ============================================================================

#[tokio::test]
async fn test_default_stage_order() {
    let router = FluentRouter::without_state(base_config())
        .unwrap()
        .setup_middleware()
        .await
        .unwrap();

    assert_eq!(
        router.stage_names(),
        ["body", "admission", "access", "timing", "not_found", "auth", "rpc"]
    );
}

#[tokio::test]
async fn test_stage_names_empty_before_setup() {
    let router = FluentRouter::without_state(base_config()).unwrap();
    assert!(router.stage_names().is_empty());
}

#[tokio::test]
async fn test_include_list_limits_stages() {
    let config = create_config_with_toml(r#"include = ["error-boundary", "not-found", "timing"]"#);
    let router = FluentRouter::without_state(config)
        .unwrap()
        .setup_middleware()
        .await
        .unwrap();

    assert_eq!(router.stage_names(), ["timing", "not_found"]);
}

#[tokio::test]
async fn test_excluded_middleware_leave_no_trace() {
    let config = create_config_with_toml(
        r#"exclude = ["request-id", "security-headers", "timing", "rate-limiting"]"#,
    );
    let app = app_with(config).await;

    let response = app.oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    for name in [
        "x-request-id",
        "x-frame-options",
        "x-response-time",
        "x-ratelimit-limit",
    ] {
        assert!(response.headers().get(name).is_none(), "{name} was set");
    }
}

// ============================================================================
// Successful requests
// ============================================================================

#[tokio::test]
async fn test_success_carries_every_header() {
    let app = app_with(base_config()).await;

    let response = app.oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert!(headers["x-response-time"].to_str().unwrap().ends_with("ms"));
    assert_eq!(headers["x-ratelimit-limit"], "100");
    assert_eq!(headers["x-ratelimit-remaining"], "99");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");

    assert_eq!(
        get_body_json(response).await,
        json!({
            "statusCode": 200,
            "message": "Request successful",
            "data": { "greeting": "hello" },
        })
    );
}

#[tokio::test]
async fn test_incoming_request_id_is_kept() {
    let app = app_with(base_config()).await;

    let mut req = request(Method::GET, "/hello");
    req.headers_mut()
        .insert("x-request-id", "trace-me-123".parse().unwrap());

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me-123");
}

#[tokio::test]
async fn test_generated_request_ids_differ() {
    let app = app_with(base_config()).await;

    let first = app.clone().oneshot(request(Method::GET, "/hello")).await.unwrap();
    let second = app.oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_ne!(
        first.headers()["x-request-id"],
        second.headers()["x-request-id"]
    );
}

#[tokio::test]
async fn test_routes_merged_before_setup_run_through_pipeline() {
    let app = FluentRouter::without_state(base_config())
        .unwrap()
        .merge(Router::new().route("/plain", get(|| async { "plain" })))
        .setup_middleware()
        .await
        .unwrap()
        .into_inner();

    let response = app.oneshot(request(Method::GET, "/plain")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-response-time"));
}

// ============================================================================
// Body parsing
// ============================================================================

#[tokio::test]
async fn test_parsed_json_body_reaches_handler() {
    let app = FluentRouter::without_state(base_config())
        .unwrap()
        .register(
            RouteDescriptor::post("echo", "/echo").handler(|body: ParsedBody| async move {
                build_success(json!({ "data": body.as_json().cloned() }))
            }),
        )
        .unwrap()
        .setup_middleware()
        .await
        .unwrap()
        .into_inner();

    let mut req = request_from(PEER, Method::POST, "/echo", Body::from(r#"{"name":"ada"}"#));
    req.headers_mut()
        .insert("content-type", "application/json".parse().unwrap());

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["data"], json!({ "name": "ada" }));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = app_with(base_config()).await;

    let body = Body::from(vec![b'x'; 2048]);
    let response = app
        .oneshot(request_from(PEER, Method::POST, "/hello", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = get_body_json(response).await;
    assert_eq!(body["statusCode"], 413);
    assert_eq!(body["message"], "Payload Too Large");
}

// ============================================================================
// Admission control and access filtering
// ============================================================================

#[tokio::test]
async fn test_budget_exhaustion_returns_429() {
    let config = create_config_with_toml(
        r#"
[http.rate_limit]
window = "60s"
max_requests = 2
"#,
    );
    let app = app_with(config).await;

    for expected_remaining in ["1", "0"] {
        let response = app.clone().oneshot(request(Method::GET, "/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let response = app.clone().oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(
        get_body_json(response).await,
        json!({ "statusCode": 429, "message": "Please slow down your requests." })
    );

    // Another client still has its full budget.
    let response = app
        .oneshot(request_from("10.0.0.2:4000", Method::GET, "/hello", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_zero_budget_disables_admission() {
    let config = create_config_with_toml(
        r#"
[http.rate_limit]
max_requests = 0
"#,
    );
    let router = FluentRouter::without_state(config)
        .unwrap()
        .setup_middleware()
        .await
        .unwrap();
    assert!(!router.stage_names().contains(&"admission"));
}

#[tokio::test]
async fn test_denied_client_gets_403() {
    let config = create_config_with_toml(
        r#"
[http.access]
deny = ["10.0.0.*"]
"#,
    );
    let app = app_with(config).await;

    let response = app.clone().oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        get_body_json(response).await,
        json!({ "statusCode": 403, "message": "Access Denied!" })
    );

    let response = app
        .oneshot(request_from("192.168.1.9:4000", Method::GET, "/hello", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_is_trusted_when_enabled() {
    let config = create_config_with_toml(
        r#"
trust_forwarded_for = true

[http.access]
allow = ["203.0.113.*"]
"#,
    );
    let app = app_with(config).await;

    let mut req = request(Method::GET, "/hello");
    req.headers_mut()
        .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Authentication and RPC delegation
// ============================================================================

struct RequireToken;

impl Authenticator for RequireToken {
    fn authenticate(&self, req: axum::extract::Request) -> AuthFuture {
        Box::pin(async move {
            if req.headers().contains_key("authorization") {
                Ok(req)
            } else {
                Err(build_error(json!({ "statusCode": 401, "message": "Login required" }))
                    .into_response())
            }
        })
    }
}

#[tokio::test]
async fn test_authenticator_can_refuse() {
    let app = FluentRouter::without_state(base_config())
        .unwrap()
        .with_authenticator(RequireToken)
        .register(RouteDescriptor::get("hello", "/hello").handler(hello))
        .unwrap()
        .setup_middleware()
        .await
        .unwrap()
        .into_inner();

    let response = app.clone().oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(get_body_json(response).await["message"], "Login required");

    let mut req = request(Method::GET, "/hello");
    req.headers_mut()
        .insert("authorization", "Bearer t".parse().unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rpc_prefix_is_delegated() {
    let app = FluentRouter::without_state(base_config())
        .unwrap()
        .with_rpc_handler(|req: axum::extract::Request| async move {
            (StatusCode::NOT_FOUND, format!("rpc saw {}", req.uri().path())).into_response()
        })
        .register(RouteDescriptor::get("hello", "/hello").handler(hello))
        .unwrap()
        .setup_middleware()
        .await
        .unwrap()
        .into_inner();

    // The handler's own 404 is not taken for a missing route.
    let response = app.clone().oneshot(request(Method::POST, "/rpc/users.list")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"rpc saw /rpc/users.list");

    let response = app.clone().oneshot(request(Method::GET, "/rpcx")).await.unwrap();
    assert_eq!(get_body_json(response).await["message"], "Not Found");

    let response = app.oneshot(request(Method::GET, "/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
