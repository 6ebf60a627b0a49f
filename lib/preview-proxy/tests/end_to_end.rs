//! Runs the proxy handler against a real local upstream server

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::http::uri::Authority;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use preview_core::{OriginScheme, ProxyConfig};
use preview_proxy::transport::ensure_routable;
use preview_proxy::{
    BodySink, ChannelSink, HyperTransport, OutboundBody, ProxyBody, ProxyHandler, Transport,
    TransportError, UpstreamBody,
};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

type TestBody = BoxBody<Bytes, io::Error>;

/// Delegates to the real transport after pointing the target at a local address
struct LocalTransport {
    inner: HyperTransport,
    upstream: SocketAddr,
    targets: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for LocalTransport {
    async fn round_trip(
        &self,
        mut request: Request<OutboundBody>,
    ) -> Result<Response<UpstreamBody>, TransportError> {
        ensure_routable(request.uri())?;
        self.targets.lock().unwrap().push(request.uri().to_string());

        let mut parts = request.uri().clone().into_parts();
        parts.scheme = Some("http".parse().unwrap());
        parts.authority = Some(Authority::try_from(self.upstream.to_string()).unwrap());
        *request.uri_mut() = Uri::from_parts(parts).unwrap();

        self.inner.round_trip(request).await
    }
}

async fn upstream(request: Request<Incoming>) -> Result<Response<TestBody>, io::Error> {
    match request.uri().path() {
        "/echo" => {
            let host = request.headers()[HOST].to_str().unwrap().to_string();
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            let body = request.into_body().collect().await.unwrap().to_bytes();
            let text = format!(
                "host={} xff={} body={}",
                host,
                forwarded,
                String::from_utf8_lossy(&body)
            );
            Ok(Response::builder()
                .status(StatusCode::ACCEPTED)
                .header(CONTENT_TYPE, "text/plain")
                .header("x-upstream", "local")
                .body(Full::new(Bytes::from(text)).map_err(|never| match never {}).boxed())
                .unwrap())
        }
        "/events" => {
            let (mut sink, body) = ChannelSink::new();
            tokio::spawn(async move {
                for i in 0..3 {
                    let event = format!("data: {}\n\n", i);
                    if sink.write(Bytes::from(event)).await.is_err() {
                        return;
                    }
                    let _ = sink.flush().await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });
            Ok(Response::builder()
                .header(CONTENT_TYPE, "text/event-stream")
                .body(body.boxed())
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(
                Full::new(Bytes::from_static(b"missing"))
                    .map_err(|never| match never {})
                    .boxed(),
            )
            .unwrap()),
    }
}

/// Serve `upstream` on an ephemeral local port
async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(upstream))
                    .await;
            });
        }
    });

    addr
}

async fn handler(flush_interval: Duration) -> (ProxyHandler, Arc<LocalTransport>) {
    let upstream = start_upstream().await;
    let config = ProxyConfig::new("proxy.test", OriginScheme::Https, "svc.internal", 9443)
        .with_flush_interval(flush_interval);
    let transport = Arc::new(LocalTransport {
        inner: HyperTransport::new(Duration::from_secs(5)).unwrap(),
        upstream,
        targets: Mutex::new(Vec::new()),
    });
    (ProxyHandler::new(Arc::new(config), transport.clone()), transport)
}

fn client() -> SocketAddr {
    "192.0.2.44:50000".parse().unwrap()
}

async fn body_text(response: Response<ProxyBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_proxies_request_and_response() {
    let (handler, transport) = handler(Duration::ZERO).await;

    let request = Request::builder()
        .method("POST")
        .uri("/echo?x=1")
        .header(HOST, "Tenant-A.proxy.test:18080")
        .header("x-forwarded-for", "198.51.100.3")
        .body(Full::new(Bytes::from_static(b"ping")))
        .unwrap();

    let response = handler.handle(request, client()).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    assert_eq!(response.headers()["x-upstream"], "local");
    assert_eq!(
        body_text(response).await,
        "host=Tenant-A.proxy.test:18080 xff=198.51.100.3, 192.0.2.44 body=ping"
    );
    assert_eq!(
        transport.targets.lock().unwrap()[0],
        "https://tenant-a.svc.internal:9443/echo?x=1"
    );
}

#[tokio::test]
async fn test_relays_upstream_status() {
    let (handler, _) = handler(Duration::ZERO).await;

    let request = Request::builder()
        .uri("/nowhere")
        .header(HOST, "tenant.proxy.test")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = handler.handle(request, client()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "missing");
}

#[tokio::test]
async fn test_streams_events_with_flush_interval() {
    let (handler, _) = handler(Duration::from_millis(5)).await;

    let request = Request::builder()
        .uri("/events")
        .header(HOST, "stream.proxy.test")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = handler.handle(request, client()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");

    // The first event arrives long before the upstream finishes
    let mut body = response.into_body();
    let first = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .into_data()
        .unwrap();
    assert_eq!(first, Bytes::from_static(b"data: 0\n\n"));

    let rest = body.collect().await.unwrap().to_bytes();
    assert_eq!(rest, Bytes::from_static(b"data: 1\n\ndata: 2\n\n"));
}

#[tokio::test]
async fn test_host_outside_proxy_domain_is_rejected() {
    let (handler, transport) = handler(Duration::ZERO).await;

    let request = Request::builder()
        .uri("/echo")
        .header(HOST, "tenant.example.org")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = handler.handle(request, client()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, r#"{"status":"error"}"#);
    assert!(transport.targets.lock().unwrap().is_empty());
}
