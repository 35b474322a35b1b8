//! Full-stack tests for `FluentRouter`.
//!
//! Helpers:
//! - `create_config_with_toml` - base config plus extra `[http]` keys or tables
//! - `request` / `request_from` - requests carrying a peer address
//! - `get_body_json` - reads a response body as JSON
//! - `collecting_reporter` - a crash reporter that keeps what it sees

mod pipeline;

use crate::{Config, ErrorRecord};

use {
    axum::{body::Body, extract::ConnectInfo, response::Response},
    http::{Method, Request},
    serde_json::Value,
    std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    },
};

const BASE_CONFIG_TOML: &str = r#"
[logging]
format = "json"

[http]
bind_addr = "127.0.0.1"
bind_port = 0
max_payload_size_bytes = "1KiB"
"#;

/// Appends `additional` to the `[http]` table of the base config.
pub(super) fn create_config_with_toml(additional: &str) -> Config {
    format!("{BASE_CONFIG_TOML}{additional}")
        .parse()
        .expect("test config should parse")
}

pub(super) fn base_config() -> Config {
    create_config_with_toml("")
}

pub(super) const PEER: &str = "10.0.0.1:4000";

pub(super) fn request(method: Method, uri: &str) -> Request<Body> {
    request_from(PEER, method, uri, Body::empty())
}

pub(super) fn request_from(peer: &str, method: Method, uri: &str, body: Body) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("valid peer address");
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
        .body(body)
        .expect("valid request")
}

pub(super) async fn get_body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub(super) type Reports = Arc<Mutex<Vec<ErrorRecord>>>;

pub(super) fn collecting_reporter() -> (Reports, impl Fn(&ErrorRecord) + Send + Sync + 'static) {
    let reports: Reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    (reports, move |record: &ErrorRecord| {
        sink.lock().unwrap().push(record.clone())
    })
}
