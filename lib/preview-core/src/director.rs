//! Subdomain routing: maps an inbound Host to an upstream scheme and authority

use crate::ProxyConfig;
use std::sync::Arc;
use tracing::warn;

/// Outcome of routing one inbound request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Forward to `scheme://host`, where `host` carries the origin port
    Route { scheme: String, host: String },
    /// Host did not match the proxy domain
    Rejected,
}

impl RoutingDecision {
    /// Upstream scheme, empty when rejected
    pub fn scheme(&self) -> &str {
        match self {
            RoutingDecision::Route { scheme, .. } => scheme,
            RoutingDecision::Rejected => "",
        }
    }

    /// Upstream authority, empty when rejected
    pub fn host(&self) -> &str {
        match self {
            RoutingDecision::Route { host, .. } => host,
            RoutingDecision::Rejected => "",
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, RoutingDecision::Rejected)
    }
}

/// Lowercase a subdomain label and replace `/` and `.` with `-`
///
/// Keeps the label from injecting path segments or extra host labels into
/// the upstream authority.
pub fn sanitize_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .collect()
}

/// Pure routing decision logic over a shared, immutable configuration
#[derive(Clone, Debug)]
pub struct RoutingDirector {
    config: Arc<ProxyConfig>,
}

impl RoutingDirector {
    /// Create a director reading from the shared process configuration
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }

    /// Decide the upstream for an inbound Host value (port suffix allowed)
    pub fn direct(&self, host: &str) -> RoutingDecision {
        // Port is irrelevant to routing
        let host = host.split(':').next().unwrap_or_default();

        if !host.ends_with(self.config.proxy_domain.as_str()) {
            warn!(
                host = %host,
                proxy_domain = %self.config.proxy_domain,
                "Host does not match proxy domain"
            );
            return RoutingDecision::Rejected;
        }

        // Leftmost label only, whatever the depth of the subdomain
        let label = host.split('.').next().unwrap_or_default();
        let subdomain = sanitize_label(label);

        RoutingDecision::Route {
            scheme: self.config.origin_scheme.as_str().to_string(),
            host: format!(
                "{}.{}:{}",
                subdomain, self.config.origin_base_domain, self.config.origin_port
            ),
        }
    }
}
