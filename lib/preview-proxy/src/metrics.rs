//! Prometheus metrics for proxied requests

use crate::middleware::{Middleware, MiddlewareContext};
use anyhow::Result;
use hyper::StatusCode;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::debug;

/// Prometheus metrics collector for proxied requests
///
/// Clones share the same registry and metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    /// Inbound requests by method
    pub requests_total: IntCounterVec,
    /// Responses sent to clients by status code
    pub responses_total: IntCounterVec,
    /// Time until the response status was known, by method
    pub request_duration_seconds: HistogramVec,
    /// Round trips that failed in the transport
    pub upstream_errors_total: IntCounter,
    /// Requests whose Host did not match the proxy domain
    pub unroutable_requests_total: IntCounter,
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    /// Create a collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Total inbound HTTP requests"),
            &["method"],
        )?;

        let responses_total = IntCounterVec::new(
            Opts::new("proxy_responses_total", "Total HTTP responses by status"),
            &["status"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "proxy_request_duration_seconds",
                "Time until the response status was known, in seconds",
            ),
            &["method"],
        )?;

        let upstream_errors_total = IntCounter::new(
            "proxy_upstream_errors_total",
            "Total failed upstream round trips",
        )?;

        let unroutable_requests_total = IntCounter::new(
            "proxy_unroutable_requests_total",
            "Total requests whose host did not match the proxy domain",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(responses_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(upstream_errors_total.clone()))?;
        registry.register(Box::new(unroutable_requests_total.clone()))?;

        Ok(Self {
            requests_total,
            responses_total,
            request_duration_seconds,
            upstream_errors_total,
            unroutable_requests_total,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Prometheus metrics middleware
pub struct MetricsMiddleware {
    pub collector: MetricsCollector,
}

impl MetricsMiddleware {
    /// Create metrics middleware recording into `collector`
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

#[async_trait::async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "MetricsMiddleware"
    }

    async fn on_request(&self, context: &MiddlewareContext) -> Result<()> {
        self.collector
            .requests_total
            .with_label_values(&[context.method.as_str()])
            .inc();
        Ok(())
    }

    async fn on_response(&self, context: &MiddlewareContext, status: StatusCode) -> Result<()> {
        debug!(method = %context.method, status = status.as_u16(), "Recording response metrics");

        self.collector
            .responses_total
            .with_label_values(&[status.as_str()])
            .inc();
        self.collector
            .request_duration_seconds
            .with_label_values(&[context.method.as_str()])
            .observe(context.elapsed().as_secs_f64());
        Ok(())
    }
}
