//! Shutdown notifications.
//!
//! [`FluentRouter::start`](crate::FluentRouter::start) reports the progress of
//! a graceful shutdown through a [`ShutdownNotifier`]. Background work can
//! either watch the [`CancellationToken`] (cancelled when shutdown begins) or
//! subscribe to the individual [`ShutdownPhase`]s.
//!
//! ```rust,no_run
//! use axum_envelope::{Config, FluentRouter, ShutdownPhase};
//!
//! # async fn example() -> axum_envelope::Result<()> {
//! let router = FluentRouter::without_state(Config::default())?;
//! let token = router.cancellation_token();
//! let mut phases = router.subscribe_to_shutdown();
//!
//! tokio::spawn(async move {
//!     token.cancelled().await;
//!     tracing::info!("Flushing crash reports");
//! });
//! tokio::spawn(async move {
//!     while let Ok(phase) = phases.recv().await {
//!         if let ShutdownPhase::GracePeriodStarted { timeout } = phase {
//!             tracing::info!("{}s to drain", timeout.as_secs());
//!         }
//!     }
//! });
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// The phases of a graceful shutdown, emitted in this order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// SIGTERM or SIGINT received; the cancellation token is cancelled.
    Initiated,

    /// No new connections are accepted; in-flight requests have `timeout`
    /// to complete.
    GracePeriodStarted { timeout: Duration },

    /// The grace period expired before all requests completed.
    GracePeriodEnded,
}

/// Broadcasts [`ShutdownPhase`]s and owns the shutdown cancellation token.
///
/// Clones share the same channel and token.
#[derive(Clone)]
pub struct ShutdownNotifier {
    sender: broadcast::Sender<ShutdownPhase>,
    cancel_token: CancellationToken,
}

impl ShutdownNotifier {
    /// Creates a notifier buffering up to `capacity` unread phases per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Subscribers only receive phases emitted after they subscribed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownPhase> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    #[must_use]
    pub fn is_shutdown_initiated(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Sends `phase` to every subscriber and returns how many received it.
    /// [`ShutdownPhase::Initiated`] also cancels the token.
    pub(crate) fn emit(&self, phase: ShutdownPhase) -> usize {
        if phase == ShutdownPhase::Initiated {
            self.cancel_token.cancel();
        }
        self.sender.send(phase).unwrap_or(0)
    }
}

impl Default for ShutdownNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

impl std::fmt::Debug for ShutdownNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownNotifier")
            .field("subscriber_count", &self.sender.receiver_count())
            .field("is_shutdown_initiated", &self.is_shutdown_initiated())
            .finish()
    }
}
