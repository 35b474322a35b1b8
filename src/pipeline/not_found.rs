//! Not-found detection.
//!
//! A bare 404 coming back from dispatch means no route matched, a bare 405
//! that a route matched the path but not the method. Both are turned into an
//! escalated [`ErrorRecord`] for the error boundary. A 404 that a handler
//! shaped into an envelope on purpose ("no such user") is a domain answer and
//! is left alone, as are RPC responses.

use super::{Chain, Stage, rpc::Delegated};
use crate::{BoxResponseFuture, Enveloped, ErrorRecord, Escalation};

use axum::{
    extract::Request,
    http::{StatusCode, header},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Stage for NotFound {
    fn name(&self) -> &'static str {
        "not_found"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        Box::pin(async move {
            let response = next.run(req).await;

            let extensions = response.extensions();
            let untouched = extensions.get::<Enveloped>().is_none()
                && extensions.get::<Escalation>().is_none()
                && extensions.get::<Delegated>().is_none();
            if !untouched {
                return response;
            }

            let record = match response.status() {
                StatusCode::NOT_FOUND => {
                    tracing::debug!(path = %path, "No route matched");
                    ErrorRecord::new(format!("Cannot find any route matching {path}"))
                        .with_status(404)
                }
                StatusCode::METHOD_NOT_ALLOWED => {
                    tracing::debug!(path = %path, %method, "Method not allowed");
                    ErrorRecord::new(format!("Method {method} is not allowed for {path}"))
                        .with_status(405)
                }
                _ => return response,
            };

            // Keep headers such as `allow` for the boundary.
            let (parts, _body) = response.into_parts();
            let mut escalated = record.escalate();
            let headers = escalated.headers_mut();
            for (name, value) in &parts.headers {
                if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
                    headers.append(name.clone(), value.clone());
                }
            }
            escalated
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pipeline, build_error};
    use axum::{
        Router,
        body::Body,
        response::{IntoResponse, Response},
        routing::get,
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut pipeline = Pipeline::default();
        pipeline.push(NotFound);
        Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/user",
                get(|| async {
                    build_error(json!({"statusCode": 404, "message": "No such user"})).into_response()
                }),
            )
            .route("/bare", get(|| async { StatusCode::NOT_FOUND }))
            .layer(pipeline.layer())
    }

    async fn get_path(path: &str) -> Response {
        app()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unmatched_route_is_escalated() {
        let response = get_path("/nowhere").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let Escalation(record) = response.extensions().get::<Escalation>().unwrap();
        assert_eq!(record.status_code, 404);
        assert_eq!(record.message, "Cannot find any route matching /nowhere");
    }

    #[tokio::test]
    async fn test_bare_404_from_handler_is_escalated() {
        let response = get_path("/bare").await;
        assert!(response.extensions().get::<Escalation>().is_some());
    }

    #[tokio::test]
    async fn test_method_mismatch_is_escalated_with_allow_header() {
        let response = app()
            .oneshot(Request::post("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().get("allow").is_some());
        let Escalation(record) = response.extensions().get::<Escalation>().unwrap();
        assert_eq!(record.status_code, 405);
        assert_eq!(record.message, "Method POST is not allowed for /ok");
    }

    #[tokio::test]
    async fn test_enveloped_404_is_a_domain_answer() {
        let response = get_path("/user").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<Escalation>().is_none());
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let response = get_path("/ok").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.extensions().get::<Escalation>().is_none());
    }

    #[tokio::test]
    async fn test_delegated_404_is_not_touched() {
        let mut pipeline = Pipeline::default();
        pipeline.push(NotFound);
        let app: Router = Router::new()
            .route(
                "/rpc",
                get(|| async {
                    let mut response = StatusCode::NOT_FOUND.into_response();
                    response.extensions_mut().insert(Delegated);
                    response
                }),
            )
            .layer(pipeline.layer());

        let response = app
            .oneshot(Request::get("/rpc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<Escalation>().is_none());
    }
}
