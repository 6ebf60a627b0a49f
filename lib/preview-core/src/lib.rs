//! Core routing and configuration for the preview proxy
//!
//! This library provides:
//! - The immutable proxy configuration shared by every request
//! - The routing director mapping an inbound Host to an upstream authority
//! - Core error types

pub mod config;
pub mod director;
pub mod error;

pub use config::{OriginScheme, ProxyConfig};
pub use director::{sanitize_label, RoutingDecision, RoutingDirector};
pub use error::{CoreError, Result};
