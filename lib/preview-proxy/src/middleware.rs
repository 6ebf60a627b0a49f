//! Middleware hooks run around every inbound request

use crate::forwarder::inbound_host;
use anyhow::Result;
use hyper::{Request, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, span, Instrument, Level};

/// Context passed through middleware chain
#[derive(Clone, Debug)]
pub struct MiddlewareContext {
    pub method: String,
    pub path: String,
    /// Inbound Host, port included
    pub host: String,
    pub client_ip: IpAddr,
    pub started_at: Instant,
}

impl MiddlewareContext {
    /// Create a new middleware context from a request
    pub fn from_request<B>(req: &Request<B>, remote_addr: SocketAddr) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            host: inbound_host(req.headers(), req.uri()).to_string(),
            client_ip: remote_addr.ip(),
            started_at: Instant::now(),
        }
    }

    /// Time since the request arrived
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Middleware trait for processing requests and responses
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str {
        "UnnamedMiddleware"
    }

    /// Called before request is processed
    async fn on_request(&self, _context: &MiddlewareContext) -> Result<()> {
        Ok(())
    }

    /// Called once the response status is known
    async fn on_response(&self, _context: &MiddlewareContext, _status: StatusCode) -> Result<()> {
        Ok(())
    }
}

/// Chain of middleware to execute in order
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty middleware chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware to the chain
    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Process request through all middleware
    pub async fn on_request(&self, context: &MiddlewareContext) -> Result<()> {
        for mw in &self.middleware {
            let span = span!(Level::DEBUG, "middleware", name = mw.name());
            mw.on_request(context).instrument(span).await?;
        }
        Ok(())
    }

    /// Process response through all middleware (in reverse order)
    pub async fn on_response(&self, context: &MiddlewareContext, status: StatusCode) -> Result<()> {
        for mw in self.middleware.iter().rev() {
            let span = span!(Level::DEBUG, "middleware", name = mw.name());
            mw.on_response(context, status).instrument(span).await?;
        }
        Ok(())
    }
}

/// Logs one access line per completed request
pub struct AccessLogMiddleware;

#[async_trait::async_trait]
impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &'static str {
        "AccessLogMiddleware"
    }

    async fn on_request(&self, context: &MiddlewareContext) -> Result<()> {
        debug!(
            method = %context.method,
            path = %context.path,
            host = %context.host,
            "Request received"
        );
        Ok(())
    }

    async fn on_response(&self, context: &MiddlewareContext, status: StatusCode) -> Result<()> {
        info!(
            method = %context.method,
            path = %context.path,
            host = %context.host,
            client_ip = %context.client_ip,
            status = status.as_u16(),
            duration_ms = context.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(())
    }
}
