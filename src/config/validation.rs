//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check backend URLs are usable `http` base URLs
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, on startup and on every reload

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{BackendConfig, ProxyConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{role} backend url {url:?} is invalid: {reason}")]
    InvalidBackendUrl {
        role: &'static str,
        url: String,
        reason: String,
    },

    #[error("primary and shadow point at the same backend {0}")]
    SameBackend(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_backend("primary", &config.primary, &mut errors);
    check_backend("shadow", &config.shadow, &mut errors);
    if config.primary.url.trim_end_matches('/') == config.shadow.url.trim_end_matches('/') {
        errors.push(ValidationError::SameBackend(config.primary.url.clone()));
    }

    if config.mirror.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "mirror.max_body_bytes" });
    }
    if config.mirror.max_pending_diffs == 0 {
        errors.push(ValidationError::Zero { field: "mirror.max_pending_diffs" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.connect_secs" });
    }

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_backend(role: &'static str, backend: &BackendConfig, errors: &mut Vec<ValidationError>) {
    let invalid = |reason: String| ValidationError::InvalidBackendUrl {
        role,
        url: backend.url.clone(),
        reason,
    };

    match Url::parse(&backend.url) {
        Ok(url) if url.scheme() != "http" => {
            errors.push(invalid(format!("unsupported scheme {}", url.scheme())))
        }
        Ok(url) if url.host_str().is_none() => errors.push(invalid("missing host".to_string())),
        Ok(url) if url.query().is_some() => {
            errors.push(invalid("query strings are not allowed".to_string()))
        }
        Ok(_) => {}
        Err(e) => errors.push(invalid(e.to_string())),
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
