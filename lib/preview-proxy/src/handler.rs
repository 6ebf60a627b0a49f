//! Per-request proxy composition: forward, round trip, stream back

use crate::body::{BoxError, ChannelSink, OutboundBody, ProxyBody};
use crate::forwarder::{inbound_host, RequestForwarder};
use crate::http::error_response;
use crate::metrics::MetricsCollector;
use crate::streamer::ResponseStreamer;
use crate::transport::Transport;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response};
use preview_core::{ProxyConfig, RoutingDirector};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// Proxies one inbound request to its subdomain's upstream
pub struct ProxyHandler {
    forwarder: RequestForwarder,
    transport: Arc<dyn Transport>,
    streamer: ResponseStreamer,
    metrics: Option<MetricsCollector>,
}

impl ProxyHandler {
    /// Create a handler routing with `config` and sending through `transport`
    pub fn new(config: Arc<ProxyConfig>, transport: Arc<dyn Transport>) -> Self {
        let streamer = ResponseStreamer::new(config.flush_interval);
        Self {
            forwarder: RequestForwarder::new(RoutingDirector::new(config)),
            transport,
            streamer,
            metrics: None,
        }
    }

    /// Count upstream failures and unroutable requests in `metrics`
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Forward `request` upstream and return the response for the client
    ///
    /// Never fails: transport errors, including unroutable hosts, become a
    /// generic 500 JSON response. On success the status and headers are
    /// returned right away while the body is relayed by a spawned task.
    pub async fn handle<B>(&self, request: Request<B>, remote_addr: SocketAddr) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let body: OutboundBody = body.map_err(|e| e.into()).boxed();
        let (outbound, decision) = self.forwarder.forward(&parts, body, remote_addr);

        // Rejected requests still go to the transport, which refuses them
        if decision.is_rejected() {
            if let Some(metrics) = &self.metrics {
                metrics.unroutable_requests_total.inc();
            }
        }

        let upstream = match self.transport.round_trip(outbound).await {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(
                    error = %e,
                    host = %inbound_host(&parts.headers, &parts.uri),
                    path = %parts.uri.path(),
                    "Proxy error"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.upstream_errors_total.inc();
                }
                return error_response();
            }
        };

        let (upstream_parts, upstream_body) = upstream.into_parts();
        debug!(status = %upstream_parts.status, "Upstream responded");

        // Body is relayed in the background; status and headers go out now
        let (sink, client_body) = ChannelSink::new();
        let streamer = self.streamer;
        tokio::spawn(async move {
            streamer.stream(upstream_body, sink).await;
        });

        let mut response = Response::new(client_body.boxed());
        *response.status_mut() = upstream_parts.status;
        *response.headers_mut() = upstream_parts.headers;
        response
    }
}
