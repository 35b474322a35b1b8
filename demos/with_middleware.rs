//! Middleware Configuration Example
//!
//! Demonstrates the configurable pipeline and its collaborators: admission
//! control, the access filter, a token authenticator, RPC delegation and a
//! crash reporter draining into a background task.
//!
//! Run with:
//! ```bash
//! cargo run --example with_middleware
//! ```
//!
//! Then test:
//! ```bash
//! # Authenticated request
//! curl -H "Authorization: Bearer demo" http://localhost:3000/api/data
//!
//! # Missing token (401 envelope)
//! curl http://localhost:3000/api/data
//!
//! # Rate limiting (make many requests quickly)
//! for i in {1..20}; do curl -s -H "Authorization: Bearer demo" http://localhost:3000/api/data; done
//!
//! # RPC delegation
//! curl -X POST -H "Authorization: Bearer demo" http://localhost:3000/rpc/ping
//!
//! # A panic, reported and rendered as a generic 500
//! curl -H "Authorization: Bearer demo" http://localhost:3000/api/crash
//! ```

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use axum_envelope::{
    AuthFuture, Authenticator, ChannelReporter, Config, Envelope, FluentRouter, Result,
    RouteDescriptor, build_error, build_success,
};
use serde_json::json;

/// Accepts requests carrying `Authorization: Bearer <token>`.
struct BearerToken(&'static str);

impl Authenticator for BearerToken {
    fn authenticate(&self, req: Request) -> AuthFuture {
        let expected = format!("Bearer {}", self.0);
        Box::pin(async move {
            let presented = req
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok());
            if presented == Some(expected.as_str()) {
                Ok(req)
            } else {
                Err(build_error(json!({ "statusCode": 401, "message": "Unauthorized" }))
                    .into_response())
            }
        })
    }
}

async fn get_data() -> Envelope {
    build_success(json!({ "data": { "message": "Hello from the API!" } }))
}

async fn crash() -> Envelope {
    panic!("demo crash");
}

async fn rpc(req: Request) -> Response {
    let method = req.uri().path().trim_start_matches("/rpc/").to_string();
    build_success(json!({ "data": { "method": method, "result": "pong" } })).into_response()
}

#[tokio::main]
async fn main() -> Result<()> {
    let config: Config = r#"
[http]
bind_addr = "127.0.0.1"
bind_port = 3000
max_payload_size_bytes = "1MiB"
rpc_prefix = "/rpc"
shutdown_timeout = "10s"

# Every middleware except timing
exclude = ["timing"]

[http.rate_limit]
window = "10s"
max_requests = 10
cleanup_interval = "30s"

[http.access]
allow = ["127.0.0.1", "::1"]
deny = []

[logging]
format = "default"
"#
    .parse()?;

    config.setup_tracing();

    let (reporter, mut reports) = ChannelReporter::channel(64);
    tokio::spawn(async move {
        while let Some(record) = reports.recv().await {
            eprintln!("crash report: {record}");
        }
    });

    let router = FluentRouter::without_state(config)?
        .with_crash_reporter(reporter)
        .with_authenticator(BearerToken("demo"))
        .with_rpc_handler(rpc)
        .register(RouteDescriptor::get("data", "/api/data").handler(get_data))?
        .register(RouteDescriptor::get("crash", "/api/crash").handler(crash))?;

    let token = router.cancellation_token();
    tokio::spawn(async move {
        token.cancelled().await;
        println!("Shutdown started, no longer accepting work");
    });

    router.setup_middleware().await?.start().await
}
