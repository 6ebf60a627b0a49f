//! Pluggable upstream round trip and the default hyper client transport

use crate::body::{BoxError, OutboundBody, UpstreamBody};
use anyhow::{Context, Result};
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::{Request, Response, Uri};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Unroutable upstream target: {0}")]
    Unroutable(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("Upstream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream request failed: {0}")]
    Other(BoxError),
}

/// Performs the network round trip for one outbound request
///
/// Implementations must fail with [`TransportError::Unroutable`] when the
/// request URI has no scheme or authority, see [`ensure_routable`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(
        &self,
        request: Request<OutboundBody>,
    ) -> Result<Response<UpstreamBody>, TransportError>;
}

/// Reject targets the director left empty
pub fn ensure_routable(uri: &Uri) -> Result<(), TransportError> {
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(TransportError::Unroutable(uri.to_string()));
    }
    Ok(())
}

type HttpsClient = Client<HttpsConnector<HttpConnector>, OutboundBody>;

/// Default transport: pooled HTTP/1.1 client speaking plain HTTP or TLS
pub struct HyperTransport {
    client: HttpsClient,
    connect_timeout: Duration,
}

impl HyperTransport {
    /// Create a transport with connection pooling and a connect timeout
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        // TCP layer; TLS is layered on top for https targets
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));
        connector.enforce_http(false);

        // Pin the ring provider instead of relying on a process default
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("Failed to select TLS protocol versions")?;
        let tls_config = match builder.clone().with_native_roots() {
            Ok(builder) => builder.with_no_client_auth(),
            Err(e) => {
                warn!(error = %e, "Native root certificates unavailable, using bundled roots");
                builder.with_webpki_roots().with_no_client_auth()
            }
        };

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new()).build(https);

        info!(
            connect_timeout_secs = connect_timeout.as_secs(),
            "Upstream transport initialized (HTTP/1.1)"
        );

        Ok(Self {
            client,
            connect_timeout,
        })
    }

    /// Upstream TCP connect timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn round_trip(
        &self,
        request: Request<OutboundBody>,
    ) -> Result<Response<UpstreamBody>, TransportError> {
        ensure_routable(request.uri())?;

        debug!(method = %request.method(), uri = %request.uri(), "Sending upstream request");

        let response = self.client.request(request).await?;
        Ok(response.map(|body| body.map_err(BoxError::from).boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Empty;
    use hyper::body::Bytes;

    fn empty_body() -> OutboundBody {
        Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed()
    }

    #[test]
    fn test_ensure_routable_accepts_absolute_uri() {
        let uri: Uri = "https://tenant1.upstream.internal:8443/a?b=c".parse().unwrap();
        assert!(ensure_routable(&uri).is_ok());
    }

    #[test]
    fn test_ensure_routable_rejects_relative_uri() {
        let uri: Uri = "/a?b=c".parse().unwrap();
        assert!(matches!(
            ensure_routable(&uri),
            Err(TransportError::Unroutable(target)) if target == "/a?b=c"
        ));
    }

    #[tokio::test]
    async fn test_transport_creation() {
        let transport = HyperTransport::new(Duration::from_secs(5)).unwrap();
        assert_eq!(transport.connect_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_target_fails_without_network() {
        let transport = HyperTransport::new(Duration::from_secs(5)).unwrap();
        let request = Request::builder()
            .uri("/healthz")
            .body(empty_body())
            .unwrap();

        let result = transport.round_trip(request).await;
        assert!(matches!(result, Err(TransportError::Unroutable(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_upstream_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HyperTransport::new(Duration::from_secs(5)).unwrap();
        let request = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(empty_body())
            .unwrap();

        let result = transport.round_trip(request).await;
        assert!(matches!(result, Err(TransportError::Upstream(_))));
    }
}
