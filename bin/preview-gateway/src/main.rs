//! preview-gateway: subdomain reverse proxy server
//!
//! Reads configuration, sets up logging and serves HTTP/1.1 until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use hyper::body::{Body, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use preview_proxy::body::BoxError;
use preview_proxy::http::{error_response, health_response, metrics_response};
use preview_proxy::{
    AccessLogMiddleware, HyperTransport, MetricsCollector, MetricsMiddleware, MiddlewareChain,
    MiddlewareContext, ProxyBody, ProxyHandler,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod args;
mod routes;

use args::{Args, LogFormat};
use routes::LocalRoute;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting preview-gateway...");

    let config = match args.proxy_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        proxy_domain = %config.proxy_domain,
        origin_scheme = %config.origin_scheme,
        origin_base_domain = %config.origin_base_domain,
        origin_port = config.origin_port,
        flush_interval_ms = config.flush_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let transport = Arc::new(
        HyperTransport::new(args.upstream_connect_timeout())
            .context("Failed to create upstream transport")?,
    );

    let metrics = MetricsCollector::new().context("Failed to create metrics collector")?;
    info!("Metrics collector initialized");

    let middleware = MiddlewareChain::new()
        .add(AccessLogMiddleware)
        .add(MetricsMiddleware::new(metrics.clone()));
    info!(count = middleware.len(), "Middleware chain initialized with access log and metrics");

    let gateway = Arc::new(Gateway {
        handler: ProxyHandler::new(config, transport).with_metrics(metrics.clone()),
        middleware,
        metrics,
    });

    let addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "HTTP server listening");

    serve(listener, gateway, args.header_read_timeout()).await;

    info!("preview-gateway stopped");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Accept connections until Ctrl-C; in-flight connections keep running
async fn serve(listener: TcpListener, gateway: Arc<Gateway>, header_read_timeout: Duration) {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Error accepting connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return;
            }
        };

        let io = TokioIo::new(stream);
        let gateway = gateway.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let gateway = gateway.clone();
                async move { Ok::<_, Infallible>(gateway.handle(req, remote_addr).await) }
            });

            if let Err(e) = http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(header_read_timeout)
                .serve_connection(io, service)
                .await
            {
                debug!(%remote_addr, error = %e, "Error serving HTTP connection");
            }
        });
    }
}

/// Everything one inbound request needs
struct Gateway {
    handler: ProxyHandler,
    middleware: MiddlewareChain,
    metrics: MetricsCollector,
}

impl Gateway {
    /// Answer local endpoints, proxy everything else, with middleware hooks around both
    async fn handle<B>(&self, req: Request<B>, remote_addr: SocketAddr) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let context = MiddlewareContext::from_request(&req, remote_addr);

        // Middleware failures never fail the request
        if let Err(e) = self.middleware.on_request(&context).await {
            debug!(error = %e, "Middleware on_request error");
        }

        // Local endpoints first, everything else goes upstream
        let response = match LocalRoute::match_path(req.uri().path()) {
            Some(LocalRoute::Health) => health_response(),
            Some(LocalRoute::Metrics) => match self.metrics.gather() {
                Ok(text) => metrics_response(text),
                Err(e) => {
                    warn!(error = %e, "Failed to gather metrics");
                    error_response()
                }
            },
            None => self.handler.handle(req, remote_addr).await,
        };

        if let Err(e) = self.middleware.on_response(&context, response.status()).await {
            debug!(error = %e, "Middleware on_response error");
        }

        response
    }
}
