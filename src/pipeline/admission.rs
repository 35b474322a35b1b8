//! Admission control.
//!
//! Counts requests per client identity in fixed windows. The first request of
//! an identity (or the first after its window expired) opens a new window with
//! a count of one; every later request in the window increments the count, and
//! a count above the budget is answered with 429.
//!
//! Every response that passed through this stage carries the quota headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-ratelimit-limit` | the budget per window |
//! | `x-ratelimit-remaining` | requests left in the current window |
//! | `x-ratelimit-reset` | seconds until the window resets, rounded up |
//! | `retry-after` | same as `x-ratelimit-reset`, on rejection only |
//!
//! Window state lives behind [`RateStore`]. The in-memory [`MemoryRateStore`]
//! updates a window atomically per identity; an external store must provide an
//! atomic increment of its own.

use super::{Chain, Stage};
use crate::{BoxResponseFuture, build_error, utils::client_identity};

use {
    axum::{
        extract::Request,
        http::{HeaderName, HeaderValue, header},
        response::{IntoResponse, Response},
    },
    dashmap::DashMap,
    serde_json::json,
    std::{
        future::Future,
        pin::Pin,
        sync::Arc,
        time::{Duration, Instant},
    },
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Message of the 429 envelope.
pub const SLOW_DOWN_MESSAGE: &str = "Please slow down your requests.";

/// Admission state of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: Instant,
}

impl RateWindow {
    /// Time left until the window expires, zero once it has.
    pub fn remaining_time(&self, window: Duration, now: Instant) -> Duration {
        (self.window_start + window).saturating_duration_since(now)
    }

    pub fn is_expired(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Backing store for rate windows.
pub trait RateStore: Send + Sync + 'static {
    /// Counts one request for `identity` and returns its window afterwards.
    ///
    /// Opening a new window when the previous one expired and incrementing the
    /// count are one indivisible step.
    fn increment<'a>(
        &'a self,
        identity: &'a str,
        window: Duration,
    ) -> Pin<Box<dyn Future<Output = RateWindow> + Send + 'a>>;

    /// Drops expired windows and returns how many were removed.
    fn evict_expired(&self, window: Duration) -> usize;
}

/// A [`RateStore`] held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRateStore {
    windows: Arc<DashMap<String, RateWindow>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<RateWindow> {
        self.windows.get(identity).map(|entry| *entry)
    }

    fn increment_at(&self, identity: &str, window: Duration, now: Instant) -> RateWindow {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .windows
            .entry(identity.to_string())
            .or_insert(RateWindow {
                count: 0,
                window_start: now,
            });

        if entry.count > 0 && entry.is_expired(window, now) {
            *entry = RateWindow {
                count: 1,
                window_start: now,
            };
        } else {
            entry.count = entry.count.saturating_add(1);
        }
        *entry
    }

    fn evict_at(&self, window: Duration, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| !state.is_expired(window, now));
        before.saturating_sub(self.windows.len())
    }
}

impl RateStore for MemoryRateStore {
    fn increment<'a>(
        &'a self,
        identity: &'a str,
        window: Duration,
    ) -> Pin<Box<dyn Future<Output = RateWindow> + Send + 'a>> {
        Box::pin(std::future::ready(self.increment_at(
            identity,
            window,
            Instant::now(),
        )))
    }

    fn evict_expired(&self, window: Duration) -> usize {
        self.evict_at(window, Instant::now())
    }
}

/// The admission control stage.
pub struct Admission {
    store: Arc<dyn RateStore>,
    window: Duration,
    max_requests: u32,
    trust_forwarded_for: bool,
}

impl Admission {
    pub fn new(
        store: Arc<dyn RateStore>,
        window: Duration,
        max_requests: u32,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            store,
            window,
            max_requests,
            trust_forwarded_for,
        }
    }
}

impl Stage for Admission {
    fn name(&self) -> &'static str {
        "admission"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let store = self.store.clone();
        let window = self.window;
        let limit = self.max_requests;
        let identity = client_identity(&req, self.trust_forwarded_for);

        Box::pin(async move {
            let state = store.increment(&identity, window).await;
            let remaining = limit.saturating_sub(state.count);
            let reset = ceil_secs(state.remaining_time(window, Instant::now()));

            if state.count > limit {
                tracing::warn!(
                    identity = %identity,
                    count = state.count,
                    limit,
                    "Rate limit exceeded"
                );
                let mut response = build_error(json!({
                    "statusCode": 429,
                    "message": SLOW_DOWN_MESSAGE,
                }))
                .into_response();
                set_quota_headers(&mut response, limit, remaining, reset);
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(reset));
                return response;
            }

            let mut response = next.run(req).await;
            set_quota_headers(&mut response, limit, remaining, reset);
            response
        })
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn set_quota_headers(response: &mut Response, limit: u32, remaining: u32, reset: u64) {
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset));
}
