mod access;
mod middleware;
mod rate_limit;

pub use access::*;
pub use middleware::*;
pub use rate_limit::*;

use {crate::Result, serde::Deserialize, std::fmt, std::time::Duration};

/// X-Frame-Options header value configuration.
///
/// When the `security-headers` feature is enabled this is converted to the
/// matching `axum_helmet::XFrameOptions` value.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum XFrameOptions {
    /// Prevents the page from being displayed in a frame
    #[default]
    Deny,
    /// Allows the page to be displayed in a frame on the same origin
    SameOrigin,
    /// Allows the page to be displayed in a frame on the specified origin
    #[serde(rename = "ALLOW-FROM")]
    AllowFrom(String),
}

impl fmt::Display for XFrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XFrameOptions::Deny => write!(f, "DENY"),
            XFrameOptions::SameOrigin => write!(f, "SAMEORIGIN"),
            XFrameOptions::AllowFrom(url) => write!(f, "ALLOW-FROM {}", url),
        }
    }
}

///
/// Configuration for the HTTP server and its request pipeline.
///
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// IP address to bind the HTTP server to.
    /// The default `bind_addr` is "127.0.0.1".
    #[serde(default = "HttpConfig::default_bind_addr")]
    pub bind_addr: String,

    /// Port to bind the HTTP server to.
    /// The default `bind_port` is 3000.
    #[serde(default = "HttpConfig::default_bind_port")]
    pub bind_port: u16,

    /// Maximum request body the body parsing stage will buffer.
    /// Larger bodies are answered with a 413 envelope.
    /// By default `max_payload_size_bytes` is 32KiB.
    #[serde(default = "HttpConfig::default_max_payload_size_bytes")]
    pub max_payload_size_bytes: byte_unit::Byte,

    /// Whether to set the X-Content-Type-Options header to "nosniff".
    /// By default `x_content_type_nosniff` is set to true.
    #[serde(default = "HttpConfig::default_x_content_type_nosniff")]
    pub x_content_type_nosniff: bool,

    /// Whether to set the X-Frame-Options header to "DENY", "SAMEORIGIN" or a URI.
    /// By default `x_frame_options` is set to "DENY".
    #[serde(default = "HttpConfig::default_x_frame_options")]
    pub x_frame_options: HttpXFrameConfig,

    /// Path prefix handed to the RPC handler instead of the route table.
    /// By default `rpc_prefix` is "/rpc".
    #[serde(default = "HttpConfig::default_rpc_prefix")]
    pub rpc_prefix: String,

    /// Whether the first `X-Forwarded-For` hop identifies the client.
    /// Only enable this behind a proxy that sets the header.
    /// By default `trust_forwarded_for` is false.
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Maximum time to wait for graceful shutdown to complete.
    /// By default `shutdown_timeout` is set to 30 seconds.
    #[serde(
        default = "HttpConfig::default_shutdown_timeout",
        with = "humantime_serde"
    )]
    pub shutdown_timeout: Duration,

    /// Per-client request budget.
    #[serde(default)]
    pub rate_limit: HttpRateLimitConfig,

    /// Allow/deny patterns over the client address.
    #[serde(default)]
    pub access: HttpAccessConfig,

    #[serde(flatten)]
    pub middleware: Option<HttpMiddlewareConfig>,
}

impl HttpConfig {
    ///
    /// Returns the full bind address as a string in the format "IP:PORT".
    ///
    pub fn full_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    fn default_bind_addr() -> String {
        "127.0.0.1".into()
    }

    fn default_bind_port() -> u16 {
        3000
    }

    fn default_max_payload_size_bytes() -> byte_unit::Byte {
        byte_unit::Byte::from_u64(32 * 1024)
    }

    fn default_x_content_type_nosniff() -> bool {
        true
    }

    fn default_x_frame_options() -> HttpXFrameConfig {
        HttpXFrameConfig(XFrameOptions::Deny)
    }

    fn default_rpc_prefix() -> String {
        "/rpc".into()
    }

    fn default_shutdown_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(crate::Error::invalid_input(
                "HTTP bind_addr is required. Set [http] bind_addr = \"0.0.0.0\" or \"127.0.0.1\" in config.",
            ));
        }

        if self.bind_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(crate::Error::invalid_input(
                "HTTP bind_addr must be a valid IP address. Examples: \"127.0.0.1\", \"0.0.0.0\", \"::1\"",
            ));
        }

        if !self.rpc_prefix.starts_with('/') {
            return Err(crate::Error::invalid_input(format!(
                "HTTP rpc_prefix must start with '/', got \"{}\"",
                self.rpc_prefix
            )));
        }

        self.rate_limit.validate()?;
        self.access.validate()?;

        if let Some(middleware_config) = &self.middleware {
            middleware_config.validate()?;
        }

        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind_addr: Self::default_bind_addr(),
            bind_port: Self::default_bind_port(),
            max_payload_size_bytes: Self::default_max_payload_size_bytes(),
            x_content_type_nosniff: Self::default_x_content_type_nosniff(),
            x_frame_options: Self::default_x_frame_options(),
            rpc_prefix: Self::default_rpc_prefix(),
            trust_forwarded_for: false,
            shutdown_timeout: Self::default_shutdown_timeout(),
            rate_limit: HttpRateLimitConfig::default(),
            access: HttpAccessConfig::default(),
            middleware: None,
        }
    }
}

/// Configuration wrapper for the X-Frame-Options security header.
///
/// - `"DENY"` or `"deny"` - Prevents the page from being displayed in a frame
/// - `"SAMEORIGIN"` or `"sameorigin"` - Allows framing only from the same origin
/// - Any other string - Treated as `AllowFrom(url)` to allow specific origins
///
/// ```toml
/// x_frame_options = "DENY"
/// x_frame_options = "SAMEORIGIN"
/// x_frame_options = "https://example.com"
/// ```
#[derive(Clone)]
pub struct HttpXFrameConfig(pub XFrameOptions);

impl HttpXFrameConfig {
    pub fn deny() -> Self {
        HttpXFrameConfig(XFrameOptions::Deny)
    }
    pub fn same_origin() -> Self {
        HttpXFrameConfig(XFrameOptions::SameOrigin)
    }
    pub fn allow_from(url: impl Into<String>) -> Self {
        HttpXFrameConfig(XFrameOptions::AllowFrom(url.into()))
    }
}

impl Default for HttpXFrameConfig {
    fn default() -> Self {
        Self::deny()
    }
}

impl std::fmt::Debug for HttpXFrameConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for HttpXFrameConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let x_frame_options = match s.to_uppercase().as_str() {
            "DENY" => XFrameOptions::Deny,
            "SAMEORIGIN" => XFrameOptions::SameOrigin,
            _ => XFrameOptions::AllowFrom(s),
        };
        Ok(HttpXFrameConfig(x_frame_options))
    }
}
