//! Canned responses produced by the proxy itself

use crate::body::ProxyBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// JSON body shared by the health and error responses
#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
}

/// Wrap a complete payload as a client response body
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Create a `{"status":"..."}` JSON response
pub fn status_response(status: StatusCode, status_text: &str) -> Response<ProxyBody> {
    let body = serde_json::to_vec(&StatusBody {
        status: status_text,
    })
    .unwrap_or_default();

    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Create the 200 health check response
pub fn health_response() -> Response<ProxyBody> {
    status_response(StatusCode::OK, "ok")
}

/// Create the 500 response sent for any upstream or routing failure
///
/// Deliberately carries no detail about the failure.
pub fn error_response() -> Response<ProxyBody> {
    status_response(StatusCode::INTERNAL_SERVER_ERROR, "error")
}

/// Create a Prometheus text exposition response
pub fn metrics_response(text: String) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(text));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response<ProxyBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_response() {
        let response = health_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"status":"error"}"#);
    }

    #[tokio::test]
    async fn test_metrics_response() {
        let response = metrics_response("# HELP x y\n".to_string());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "# HELP x y\n");
    }
}
