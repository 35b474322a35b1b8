use {
    crate::{Error, Result},
    serde::Deserialize,
    std::time::Duration,
};

/// Configuration for the admission controller.
///
/// ```toml
/// [http.rate_limit]
/// window = "15m"
/// max_requests = 100
/// cleanup_interval = "1m"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HttpRateLimitConfig {
    /// Length of one counting window.
    /// By default `window` is 60 seconds.
    #[serde(
        default = "HttpRateLimitConfig::default_window",
        with = "humantime_serde"
    )]
    pub window: Duration,

    /// Requests allowed per identity within one window. 0 disables the limiter.
    /// By default `max_requests` is 100.
    #[serde(default = "HttpRateLimitConfig::default_max_requests")]
    pub max_requests: u32,

    /// How often expired windows are evicted from memory.
    /// By default `cleanup_interval` is 60 seconds.
    #[serde(
        default = "HttpRateLimitConfig::default_cleanup_interval",
        with = "humantime_serde"
    )]
    pub cleanup_interval: Duration,
}

impl HttpRateLimitConfig {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    fn default_window() -> Duration {
        Duration::from_secs(60)
    }

    fn default_max_requests() -> u32 {
        100
    }

    fn default_cleanup_interval() -> Duration {
        Duration::from_secs(60)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(Error::invalid_input(
                "HTTP rate_limit window must be > 0. Set [http.rate_limit] window = \"60s\" in config.",
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::invalid_input(
                "HTTP rate_limit cleanup_interval must be > 0.",
            ));
        }
        Ok(())
    }
}

impl Default for HttpRateLimitConfig {
    fn default() -> Self {
        Self {
            window: Self::default_window(),
            max_requests: Self::default_max_requests(),
            cleanup_interval: Self::default_cleanup_interval(),
        }
    }
}
