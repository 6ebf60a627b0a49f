//! Command line and environment configuration

use clap::{Parser, ValueEnum};
use preview_core::{OriginScheme, ProxyConfig};
use std::time::Duration;

/// Output format of the process log
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "preview-gateway")]
#[command(author, version, about = "Subdomain-based reverse proxy for preview environments")]
pub struct Args {
    /// Port to listen on, all interfaces
    #[arg(long, default_value = "18080", env = "PORT")]
    pub port: u16,

    /// Domain every inbound host must end with
    #[arg(long, default_value = "localhost", env = "PROXY_DOMAIN")]
    pub proxy_domain: String,

    /// Scheme used to reach upstreams (http or https)
    #[arg(long, default_value = "http", env = "ORIGIN_SCHEME")]
    pub origin_scheme: OriginScheme,

    /// Base domain appended to the subdomain label
    #[arg(long, default_value = "", env = "ORIGIN_BASE_DOMAIN")]
    pub origin_base_domain: String,

    /// Port used to reach upstreams
    #[arg(long, default_value = "443", env = "ORIGIN_PORT")]
    pub origin_port: u16,

    /// Response flush period in milliseconds, 0 disables periodic flushing
    #[arg(long, default_value = "0", env = "FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: u64,

    #[arg(long, default_value = "3", env = "HEADER_READ_TIMEOUT_SECS")]
    pub header_read_timeout_secs: u64,

    #[arg(long, default_value = "30", env = "UPSTREAM_CONNECT_TIMEOUT_SECS")]
    pub upstream_connect_timeout_secs: u64,

    #[arg(long, value_enum, default_value = "json", env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Args {
    /// Build the validated proxy configuration
    pub fn proxy_config(&self) -> preview_core::Result<ProxyConfig> {
        let config = ProxyConfig::new(
            self.proxy_domain.clone(),
            self.origin_scheme,
            self.origin_base_domain.clone(),
            self.origin_port,
        )
        .with_flush_interval(Duration::from_millis(self.flush_interval_ms));
        config.validate()?;
        Ok(config)
    }

    /// Time allowed for a client to send request headers
    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.header_read_timeout_secs)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }
}
