//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every problem is reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "gateway.bind_address", &config.gateway.bind_address);
    check_addr(&mut errors, "backend.bind_address", &config.backend.bind_address);
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    match url::Url::parse(&config.backend.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "backend.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("backend.url", e.to_string())),
    }

    if config.gateway.request_timeout_secs == 0 {
        errors.push(ValidationError::new("gateway.request_timeout_secs", "must be > 0"));
    }
    if config.gateway.find_max_limit == 0 {
        errors.push(ValidationError::new("gateway.find_max_limit", "must be > 0"));
    }
    if config.backend.rpc_timeout_ms == 0 {
        errors.push(ValidationError::new("backend.rpc_timeout_ms", "must be > 0"));
    }
    if config.backend.store_timeout_ms == 0 {
        errors.push(ValidationError::new("backend.store_timeout_ms", "must be > 0"));
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }
    if config.circuit_breaker.reset_timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.reset_timeout_secs", "must be > 0"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
    if !(0.0..=1.0).contains(&config.retries.jitter_ratio) {
        errors.push(ValidationError::new("retries.jitter_ratio", "must be within 0.0..=1.0"));
    }
    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be > 0"));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::new("health_check.timeout_ms", "must be > 0"));
    }
    if config.health_check.healthy_threshold == 0 || config.health_check.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("health_check", "thresholds must be >= 1"));
    }
    if config.queue.max_size == 0 {
        errors.push(ValidationError::new("queue.max_size", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", value),
        ));
    }
}
