//! # axum-envelope
//!
//! An ordered request pipeline for Axum with one response shape for every
//! outcome.
//!
//! Every request runs through a fixed sequence of stages (body parsing,
//! admission control, access filtering, timing, not-found detection,
//! authentication, RPC delegation) before it reaches a statically registered
//! route table. Handlers, stages and the error boundary all answer with the
//! same JSON envelope:
//!
//! ```json
//! { "statusCode": 200, "message": "Request successful", "data": { "id": 1 } }
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum_envelope::{Config, Envelope, FluentRouter, Result, RouteDescriptor, build_success};
//! use serde_json::json;
//!
//! async fn hello() -> Envelope {
//!     build_success(json!({ "data": { "greeting": "Hello, World!" } }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default();  // Loads from config/{RUST_ENV}.toml
//!     config.setup_tracing();
//!
//!     FluentRouter::without_state(config)?
//!         .register(RouteDescriptor::get("hello", "/").handler(hello))?
//!         .setup_middleware()
//!         .await?
//!         .start()
//!         .await
//! }
//! ```
//!
//! With `config/dev.toml`:
//! ```toml
//! [http]
//! bind_port = 3000
//! max_payload_size_bytes = "1MiB"
//!
//! [http.rate_limit]
//! window = "15m"
//! max_requests = 100
//!
//! [http.access]
//! allow = []
//! deny = ["192.168.0.*"]
//! ```
//!
//! Run with `RUST_ENV=dev cargo run`.
//!
//! # What You Get
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | Envelopes | [`build_success`] / [`build_error`] normalize every payload and failure | Always |
//! | Body parsing | [`ParsedBody`] extension, 413 over `max_payload_size_bytes` | 32 KiB |
//! | Admission control | Per-client fixed window, `x-ratelimit-*` headers, 429 | 100 per 60s |
//! | Access filter | Glob allow/deny lists over the client address, 403 | Allow all |
//! | Timing | `x-response-time` header and one log line per request | Enabled |
//! | Not-found detection | Unmatched routes escalate to the error boundary | Enabled |
//! | RPC delegation | Requests under `rpc_prefix` go to an [`RpcHandler`] | `/rpc` |
//! | Error boundary | Panics and escalations are reported and rendered generically | Enabled |
//! | Request ids | UUIDv7 `x-request-id`, propagated to the response | Enabled |
//! | Security headers | X-Frame-Options, X-Content-Type-Options | Enabled |
//! | Graceful shutdown | Handles SIGTERM, drains connections | 30s timeout |
//!
//! # Cargo Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `security-headers` | Helmet security headers (default) |
//!
//! # Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`envelope`] | Envelope builder and error records ([`Envelope`], [`ErrorRecord`]) |
//! | [`route`] | Route descriptors and the route table ([`RouteTable`]) |
//! | [`pipeline`] | The ordered stages ([`Pipeline`], [`Stage`]) |
//! | [`collaborators`] | Crash reporting, RPC, authentication, store and cache interfaces |
//! | [`config`] | Configuration loading and validation ([`Config`]) |
//! | [`fluent`] | Router builder and middleware setup ([`FluentRouter`]) |
//! | [`error`] | Error types ([`Error`]) |
//!
//! # Error Handling
//!
//! Handlers return [`ErrorRecord`]s for failures the client should see:
//!
//! ```rust
//! use axum_envelope::build_error;
//! use serde_json::json;
//!
//! let record = build_error(json!({ "statusCode": 404, "message": "No such user" }));
//! assert_eq!(record.status_code, 404);
//! ```
//!
//! Records flagged `unhandled`, crate [`Error`]s and panics escalate to the
//! error boundary, which reports them to the [`CrashReporter`] and answers
//! with `{"statusCode": 500, "message": "Internal Server Error"}`.
//!
//! # Middleware Control
//!
//! ```toml
//! [http]
//! exclude = ["rate-limiting", "timing"]
//! ```
pub mod collaborators;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fluent;
pub mod pipeline;
pub mod route;
mod utils;

pub use collaborators::*;
pub use config::*;
pub use envelope::*;
pub use error::*;
pub use fluent::*;
pub use pipeline::{
    Chain, Pipeline, PipelineBuilder, PipelineLayer, PipelineService, Stage,
    access::AccessPolicy,
    admission::{MemoryRateStore, RateStore, RateWindow},
    body::ParsedBody,
    rpc::Delegated,
};
pub use route::*;
pub use utils::*;

pub type Result<T> = std::result::Result<T, Error>;
