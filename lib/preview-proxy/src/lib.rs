//! Subdomain reverse proxy: request forwarding and bounded-latency streaming
pub mod body;
pub mod forwarder;
pub mod handler;
pub mod http;
pub mod latency;
pub mod metrics;
pub mod middleware;
pub mod streamer;
pub mod transport;

pub use body::{BodySink, ChannelBody, ChannelSink, OutboundBody, ProxyBody, UpstreamBody};
pub use forwarder::RequestForwarder;
pub use handler::ProxyHandler;
pub use latency::LatencyBoundedWriter;
pub use metrics::{MetricsCollector, MetricsMiddleware};
pub use middleware::{AccessLogMiddleware, Middleware, MiddlewareChain, MiddlewareContext};
pub use streamer::ResponseStreamer;
pub use transport::{HyperTransport, Transport, TransportError};
