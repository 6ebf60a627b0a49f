//! Paths answered by the gateway itself instead of an upstream

pub const HEALTH_PATH: &str = "/proxy/healthz";
pub const METRICS_PATH: &str = "/proxy/metrics";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalRoute {
    Health,
    Metrics,
}

impl LocalRoute {
    /// Match a request path against the local endpoints
    ///
    /// Exact match only; `None` means the request is proxied.
    pub fn match_path(path: &str) -> Option<Self> {
        match path {
            HEALTH_PATH => Some(LocalRoute::Health),
            METRICS_PATH => Some(LocalRoute::Metrics),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_paths_match() {
        assert_eq!(LocalRoute::match_path("/proxy/healthz"), Some(LocalRoute::Health));
        assert_eq!(LocalRoute::match_path("/proxy/metrics"), Some(LocalRoute::Metrics));
    }

    #[test]
    fn test_other_paths_are_proxied() {
        assert_eq!(LocalRoute::match_path("/"), None);
        assert_eq!(LocalRoute::match_path("/healthz"), None);
        assert_eq!(LocalRoute::match_path("/proxy/healthz/"), None);
        assert_eq!(LocalRoute::match_path("/proxy/metrics/extra"), None);
        assert_eq!(LocalRoute::match_path("/api/proxy/healthz"), None);
    }
}
