//! Request timing. Always calls through, then stamps the elapsed time on
//! whatever response came back.

use super::{Chain, Stage};
use crate::BoxResponseFuture;

use {
    axum::{
        extract::Request,
        http::{HeaderName, HeaderValue},
    },
    std::time::Instant,
};

pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

#[derive(Debug, Clone, Copy, Default)]
pub struct Timing;

impl Stage for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let started = Instant::now();

        Box::pin(async move {
            let mut response = next.run(req).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed_ms,
                "{method} {path} {}",
                response.status().as_u16()
            );

            if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms:.3}ms")) {
                response.headers_mut().insert(X_RESPONSE_TIME, value);
            }
            response
        })
    }
}
