use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{BackoffConfig, RECONNECT_DELAY, RETRY_DELAY_HIGH, RETRY_DELAY_LOW};
use crate::headers::Headers;

pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_ESI_URL: &str = "https://esi.evetech.net";
    pub const DEFAULT_MAX_TIME: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_MAX_PENDING_TIME: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_POOL_SIZE: usize = 1;

    /// Default `strip_headers`: response headers removed before
    /// presentation (spec.md section 6).
    pub fn default_strip_headers() -> Vec<String> {
        [
            "access-control-allow-credentials",
            "access-control-allow-headers",
            "access-control-allow-methods",
            "access-control-allow-origin",
            "access-control-expose-headers",
            "access-control-max-age",
            "strict-transport-security",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

/// HTTP/2-level tuning passed straight to the `h2` client builder (spec.md
/// section 6, `ConnectionSettings`'s `http2_options`). Defaults match h2's
/// own defaults; exposed so a caller talking to a mirror with different
/// flow-control characteristics can tune them without forking the crate.
#[derive(Clone, Copy)]
pub struct Http2Options {
    pub initial_window_size: u32,
    pub initial_connection_window_size: u32,
    pub max_concurrent_streams: u32,
}

impl Default for Http2Options {
    fn default() -> Self {
        Self {
            initial_window_size: 65_535,
            initial_connection_window_size: 65_535,
            max_concurrent_streams: 100,
        }
    }
}

/// Settings for a single HTTP/2 `Connection` (spec.md section 6).
#[derive(Clone)]
pub struct ConnectionSettings {
    pub esi_url: String,
    pub http2_options: Http2Options,
    pub reconnect_delay: BackoffConfig,
    pub max_pending_time: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            esi_url: defaults::DEFAULT_ESI_URL.to_string(),
            http2_options: Http2Options::default(),
            reconnect_delay: RECONNECT_DELAY,
            max_pending_time: defaults::DEFAULT_MAX_PENDING_TIME,
        }
    }
}

/// Top-level client configuration (spec.md section 6, "Configuration
/// surface (constructor)").
#[derive(Clone)]
pub struct ClientConfig {
    pub connection_settings: ConnectionSettings,
    pub pool_size: usize,

    pub default_headers: Headers,
    pub default_query: std::collections::HashMap<String, String>,

    pub max_time: Duration,
    pub max_retries: u32,

    pub retry_delay_low: BackoffConfig,
    pub retry_delay_high: BackoffConfig,

    pub page_split_delay: Arc<dyn Fn(u32) -> Duration + Send + Sync>,

    /// Already-lowercased header names to strip from every response.
    pub strip_headers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_settings: ConnectionSettings::default(),
            pool_size: defaults::DEFAULT_POOL_SIZE,
            default_headers: Headers::new(),
            default_query: std::collections::HashMap::new(),
            max_time: defaults::DEFAULT_MAX_TIME,
            max_retries: defaults::DEFAULT_MAX_RETRIES,
            retry_delay_low: RETRY_DELAY_LOW,
            retry_delay_high: RETRY_DELAY_HIGH,
            page_split_delay: Arc::new(crate::backoff::default_page_split_delay),
            strip_headers: defaults::default_strip_headers(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn esi_url(mut self, url: impl Into<String>) -> Self {
        self.connection_settings.esi_url = url.into();
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn max_time(mut self, d: Duration) -> Self {
        self.max_time = d;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn default_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn default_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_query.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strip_headers_match_spec() {
        let cfg = ClientConfig::default();
        assert!(cfg.strip_headers.contains(&"strict-transport-security".to_string()));
        assert_eq!(cfg.strip_headers.len(), 7);
    }

    #[test]
    fn pool_size_is_clamped_to_at_least_one() {
        let cfg = ClientConfig::new().pool_size(0);
        assert_eq!(cfg.pool_size, 1);
    }

    #[test]
    fn default_page_split_delay_matches_formula() {
        let cfg = ClientConfig::default();
        assert_eq!((cfg.page_split_delay)(10), Duration::from_millis(3250));
    }
}
