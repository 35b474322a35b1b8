//! The error boundary: panic catching and rendering of escalated failures.

use super::router::FluentRouter;
use crate::{CrashReporter, ErrorRecord, Escalation, HttpMiddleware};

use {
    axum::response::{IntoResponse, Response},
    http::{HeaderMap, StatusCode, header},
    std::{any::Any, sync::Arc},
    tower_http::catch_panic::CatchPanicLayer,
};

/// Public message of every 5xx produced by the boundary.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

impl<State> FluentRouter<State>
where
    State: Clone + Send + Sync + 'static,
{
    /// Sets up the error boundary around the request pipeline.
    ///
    /// Installs two layers:
    /// 1. An inner layer that picks up responses carrying an [`Escalation`]
    ///    (unmatched routes or methods, unhandled [`ErrorRecord`]s, crate [`Error`](crate::Error)s),
    ///    reports the record and replaces the body with a generic envelope.
    /// 2. An outer [`CatchPanicLayer`] that turns a panic anywhere inside into
    ///    a reported, fatal record and a generic 500 envelope.
    ///
    /// Unhandled records and server errors are always rendered as
    /// `{"statusCode": 500, "message": "Internal Server Error"}`; escalated
    /// client errors (such as 404) keep their status with its standard reason
    /// phrase. The record's own message never reaches the client. Headers
    /// already set on the response, like the rate limit quota, are kept.
    #[must_use]
    pub fn setup_error_boundary(mut self) -> Self {
        if !self.is_middleware_enabled(HttpMiddleware::ErrorBoundary) {
            return self;
        }

        let reporter = self.reporter.clone();
        self.inner = self
            .inner
            .layer(axum::middleware::map_response(move |response: Response| {
                let reporter = reporter.clone();
                async move { render_escalation(response, reporter.as_ref()) }
            }));

        let reporter = self.reporter.clone();
        self.inner = self.inner.layer(CatchPanicLayer::custom(
            move |err: Box<dyn Any + Send + 'static>| handle_panic(err, &reporter),
        ));
        self
    }
}

fn render_escalation(response: Response, reporter: &dyn CrashReporter) -> Response {
    let Some(Escalation(record)) = response.extensions().get::<Escalation>().cloned() else {
        return response;
    };

    reporter.report(&record);
    let (parts, _body) = response.into_parts();
    generic_response(&record, parts.headers)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>, reporter: &Arc<dyn CrashReporter>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let record = ErrorRecord::new(format!("Service panicked: {detail}"))
        .with_fatal(true)
        .with_unhandled(true);
    reporter.report(&record);
    generic_response(&record, HeaderMap::new())
}

/// Builds the client-facing envelope for an escalated record.
fn generic_response(record: &ErrorRecord, headers: HeaderMap) -> Response {
    let status = if record.unhandled || record.status_code >= 500 {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::from_u16(record.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    };
    let message = if status.is_server_error() {
        INTERNAL_ERROR_MESSAGE
    } else {
        status.canonical_reason().unwrap_or("Request failed")
    };

    let mut response = ErrorRecord::new(message)
        .with_status(status.as_u16())
        .to_envelope()
        .into_response();

    let target = response.headers_mut();
    for (name, value) in &headers {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            target.append(name.clone(), value.clone());
        }
    }
    response
}
