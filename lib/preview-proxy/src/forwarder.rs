//! Builds the outbound upstream request from an inbound one
//!
//! The inbound request parts are only read; every rewrite happens on a copy.

use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::http::request::Parts;
use hyper::http::uri::PathAndQuery;
use hyper::{Request, Uri, Version};
use preview_core::{RoutingDecision, RoutingDirector};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Rewrites inbound requests toward their subdomain's upstream
#[derive(Clone, Debug)]
pub struct RequestForwarder {
    director: RoutingDirector,
}

impl RequestForwarder {
    /// Create a forwarder routing through `director`
    pub fn new(director: RoutingDirector) -> Self {
        Self { director }
    }

    /// Prepare the outbound request for `inbound`, carrying `body` along
    ///
    /// Returns the request together with the routing decision it was built
    /// from. A rejected host yields a request with no scheme or authority;
    /// the transport refuses to send it.
    pub fn forward<B>(
        &self,
        inbound: &Parts,
        body: B,
        remote_addr: SocketAddr,
    ) -> (Request<B>, RoutingDecision) {
        // Route on the Host the client asked for
        let decision = self.director.direct(inbound_host(&inbound.headers, &inbound.uri));
        let uri = target_uri(&decision, inbound.uri.path_and_query());

        // Hop-by-hop Connection header stays on this hop
        let mut headers = inbound.headers.clone();
        if carries_connection_header(&inbound.headers) {
            headers.remove(CONNECTION);
        }

        // Extend the client IP chain, never replace it
        match forwarded_for(&inbound.headers, remote_addr.ip()) {
            Some(chain) => {
                headers.insert(X_FORWARDED_FOR, chain);
            }
            None => warn!(client_ip = %remote_addr.ip(), "Could not extend X-Forwarded-For chain"),
        }

        debug!(method = %inbound.method, uri = %uri, "Prepared outbound request");

        let mut outbound = Request::new(body);
        *outbound.method_mut() = inbound.method.clone();
        *outbound.uri_mut() = uri;
        *outbound.version_mut() = Version::HTTP_11;
        *outbound.headers_mut() = headers;
        (outbound, decision)
    }
}

/// Host the client asked for: the Host header, else the request authority
pub fn inbound_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default()
}

fn carries_connection_header(headers: &HeaderMap) -> bool {
    headers.get(CONNECTION).is_some_and(|v| !v.is_empty())
}

/// Upstream URI for a decision, relative when the decision is a rejection
fn target_uri(decision: &RoutingDecision, path_and_query: Option<&PathAndQuery>) -> Uri {
    let path_and_query = path_and_query
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    if !decision.is_rejected() {
        match Uri::builder()
            .scheme(decision.scheme())
            .authority(decision.host())
            .path_and_query(path_and_query.clone())
            .build()
        {
            Ok(uri) => return uri,
            Err(e) => {
                warn!(host = %decision.host(), error = %e, "Upstream authority is not a valid URI")
            }
        }
    }

    // No scheme and no authority: the transport rejects it
    Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .unwrap_or_default()
}

/// Existing X-Forwarded-For chain followed by `client_ip`
pub fn forwarded_for(headers: &HeaderMap, client_ip: IpAddr) -> Option<HeaderValue> {
    let mut chain = Vec::new();
    let mut prior = headers.get_all(X_FORWARDED_FOR).iter().peekable();
    if prior.peek().is_some() {
        for (i, value) in prior.enumerate() {
            if i > 0 {
                chain.extend_from_slice(b", ");
            }
            chain.extend_from_slice(value.as_bytes());
        }
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(client_ip.to_string().as_bytes());
    HeaderValue::from_bytes(&chain).ok()
}
