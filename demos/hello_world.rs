//! Hello World Example
//!
//! The simplest possible axum-envelope application.
//!
//! Run with:
//! ```bash
//! cargo run --example hello_world
//! ```
//!
//! Then test:
//! ```bash
//! curl http://localhost:3000/
//! curl http://localhost:3000/greet/ada
//! curl http://localhost:3000/nowhere     # 404 envelope
//! ```

use axum::extract::Path;
use axum_envelope::{Config, Envelope, FluentRouter, Result, RouteDescriptor, build_success};
use serde_json::json;

async fn hello() -> Envelope {
    build_success("Hello, World!")
}

async fn greet(Path(name): Path<String>) -> Envelope {
    build_success(json!({
        "data": {
            "greeting": format!("Hello, {name}!"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from inline string
    // In production, use Config::default() to load from config/{RUST_ENV}.toml
    let config: Config = r#"
[http]
bind_addr = "127.0.0.1"
bind_port = 3000
max_payload_size_bytes = "1MiB"

[logging]
format = "default"
"#
    .parse()?;

    config.setup_tracing();

    println!("Starting server on http://127.0.0.1:3000");

    FluentRouter::without_state(config)?
        .register(RouteDescriptor::get("hello", "/").handler(hello))?
        .register(RouteDescriptor::get("greet", "/greet/:name").handler(greet))?
        .setup_middleware()
        .await?
        .start()
        .await
}
