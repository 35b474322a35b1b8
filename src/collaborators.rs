//! Interfaces to the systems around the pipeline.
//!
//! The pipeline only ever talks to a [`CrashReporter`], an [`RpcHandler`] and
//! an [`Authenticator`]. [`Store`] and [`Cache`] are for route handlers; the
//! pipeline never touches them. Each trait has a small in-process
//! implementation suitable for tests and single-node deployments.

use crate::{BoxResponseFuture, ErrorRecord, Result};

use {
    axum::{extract::Request, response::Response},
    dashmap::DashMap,
    std::{
        future::Future,
        pin::Pin,
        sync::Arc,
        time::{Duration, Instant},
    },
    tokio::sync::mpsc,
    uuid::Uuid,
};

// ============================================================================
// Crash reporting
// ============================================================================

/// Fire-and-forget sink for failures that escaped normal handling.
///
/// Implementations must not block: `report` is called on the request path.
pub trait CrashReporter: Send + Sync + 'static {
    fn report(&self, record: &ErrorRecord);
}

impl<F> CrashReporter for F
where
    F: Fn(&ErrorRecord) + Send + Sync + 'static,
{
    fn report(&self, record: &ErrorRecord) {
        self(record)
    }
}

/// Logs every report as an `error` event. This is the default reporter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl CrashReporter for TracingReporter {
    fn report(&self, record: &ErrorRecord) {
        tracing::error!(
            status = record.status_code,
            fatal = record.fatal,
            unhandled = record.unhandled,
            cause = ?record.cause,
            "{}",
            record.message
        );
    }
}

/// Forwards reports to a bounded channel.
///
/// Reports are dropped, not awaited, when the channel is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: mpsc::Sender<ErrorRecord>,
}

impl ChannelReporter {
    pub fn new(sender: mpsc::Sender<ErrorRecord>) -> Self {
        Self { sender }
    }

    /// Creates a reporter together with the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ErrorRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl CrashReporter for ChannelReporter {
    fn report(&self, record: &ErrorRecord) {
        if let Err(err) = self.sender.try_send(record.clone()) {
            tracing::debug!("Crash report dropped: {err}");
        }
    }
}

// ============================================================================
// Sub-protocol delegation
// ============================================================================

/// Owns every request under the RPC prefix.
///
/// Once a request is handed over the pipeline does not touch the response.
pub trait RpcHandler: Send + Sync + 'static {
    fn handle(&self, req: Request) -> BoxResponseFuture;
}

impl<F, Fut> RpcHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request) -> BoxResponseFuture {
        Box::pin(self(req))
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Result of an [`Authenticator`]: the (possibly annotated) request to carry
/// on with, or the response that ends the pipeline.
pub type AuthFuture = Pin<Box<dyn Future<Output = std::result::Result<Request, Response>> + Send>>;

/// Extension point for authentication. The default lets everything through.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, req: Request) -> AuthFuture;
}

/// Accepts every request unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, req: Request) -> AuthFuture {
        Box::pin(async move { Ok(req) })
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Create/read/update/delete keyed by an opaque string id.
pub trait Store<T>: Send + Sync {
    /// Stores `item` under a fresh id and returns the id.
    fn create(&self, item: T) -> impl Future<Output = Result<String>> + Send;

    fn read(&self, id: &str) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Replaces an existing item and returns the previous one. Unknown ids
    /// are left absent and yield `None`.
    fn update(&self, id: &str, item: T) -> impl Future<Output = Result<Option<T>>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<Option<T>>> + Send;
}

/// A [`Store`] held in memory. Ids are UUIDv7.
#[derive(Debug)]
pub struct MemoryStore<T> {
    items: Arc<DashMap<String, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Store<T> for MemoryStore<T>
where
    T: Clone + Send + Sync,
{
    async fn create(&self, item: T) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.items.insert(id.clone(), item);
        Ok(id)
    }

    async fn read(&self, id: &str) -> Result<Option<T>> {
        Ok(self.items.get(id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, id: &str, item: T) -> Result<Option<T>> {
        Ok(self
            .items
            .get_mut(id)
            .map(|mut entry| std::mem::replace(entry.value_mut(), item)))
    }

    async fn delete(&self, id: &str) -> Result<Option<T>> {
        Ok(self.items.remove(id).map(|(_, item)| item))
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Keyed get/set/delete with a per-entry time to live.
pub trait Cache<V>: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Option<V>> + Send;

    fn set(&self, key: &str, value: V, ttl: Duration) -> impl Future<Output = ()> + Send;

    /// Returns whether a live entry was removed.
    fn delete(&self, key: &str) -> impl Future<Output = bool> + Send;
}

/// A [`Cache`] held in memory. Expired entries are dropped lazily on access
/// or in bulk by [`MemoryCache::purge_expired`].
#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: Arc<DashMap<String, (V, Instant)>>,
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let value = {
            let entry = self.entries.get(key)?;
            let (value, expires_at) = entry.value();
            (*expires_at > now).then(|| value.clone())
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        value
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, (_, expires_at))| expires_at > now)
    }
}
