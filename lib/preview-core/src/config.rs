//! Proxy configuration, built once at process start and never mutated

use crate::{CoreError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Scheme used to reach upstream origins
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OriginScheme {
    #[default]
    Http,
    Https,
}

impl OriginScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginScheme::Http => "http",
            OriginScheme::Https => "https",
        }
    }
}

impl fmt::Display for OriginScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OriginScheme {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("http") {
            Ok(OriginScheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Ok(OriginScheme::Https)
        } else {
            Err(CoreError::UnsupportedScheme(s.to_string()))
        }
    }
}

/// Static proxy configuration
///
/// Read-only for every component once constructed; share it through `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Suffix every routable inbound host must end with
    pub proxy_domain: String,
    pub origin_scheme: OriginScheme,
    /// Domain appended to the extracted subdomain label
    pub origin_base_domain: String,
    pub origin_port: u16,
    /// Period of the response flush task; zero disables it
    pub flush_interval: Duration,
}

impl ProxyConfig {
    pub fn new(
        proxy_domain: impl Into<String>,
        origin_scheme: OriginScheme,
        origin_base_domain: impl Into<String>,
        origin_port: u16,
    ) -> Self {
        Self {
            proxy_domain: proxy_domain.into(),
            origin_scheme,
            origin_base_domain: origin_base_domain.into(),
            origin_port,
            flush_interval: Duration::ZERO,
        }
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Check the configuration before the server starts accepting traffic
    pub fn validate(&self) -> Result<()> {
        if self.proxy_domain.trim().is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "proxy domain must not be empty".to_string(),
            ));
        }
        if self.origin_base_domain.trim().is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "origin base domain must not be empty".to_string(),
            ));
        }
        if self.origin_port == 0 {
            return Err(CoreError::InvalidConfiguration(
                "origin port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new("localhost", OriginScheme::Http, "", 443)
    }
}
