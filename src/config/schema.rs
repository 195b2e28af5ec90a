//! Configuration schema definitions.
//!
//! One file configures both processes; each reads the sections it needs.
//! All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP-facing gateway settings.
    pub gateway: GatewayConfig,

    /// Backend service settings (also tells the gateway where to find it).
    pub backend: BackendConfig,

    /// Circuit breaker guarding gateway → backend calls.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Health prober settings.
    pub health_check: HealthCheckConfig,

    /// Request queue bounds and failure policy.
    pub queue: QueueConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Gateway listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Upper bound for `limit` on name lookups.
    pub find_max_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
            find_max_limit: 1000,
        }
    }
}

/// Backend service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Address the backend's RPC listener binds to.
    pub bind_address: String,

    /// Base URL the gateway uses to reach the backend.
    pub url: String,

    /// Deadline for a single RPC attempt in milliseconds.
    pub rpc_timeout_ms: u64,

    /// Deadline for a single store call in milliseconds.
    pub store_timeout_ms: u64,

    /// Optional JSON file the document store is loaded from and saved to.
    pub persistence_path: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:50051".to_string(),
            url: "http://127.0.0.1:50051".to_string(),
            rpc_timeout_ms: 2000,
            store_timeout_ms: 5000,
            persistence_path: None,
        }
    }
}

impl BackendConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial call is allowed.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 6,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Backoff curve between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// base, 2×base, 4×base, ...
    Exponential,
    /// base, 2×base, 3×base, ...
    Linear,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Total attempts per logical call, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Shape of the delay schedule.
    pub backoff: BackoffKind,

    /// Random jitter added to each delay, as a fraction of it (0.0 - 1.0).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            backoff: BackoffKind::Exponential,
            jitter_ratio: 0.1,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background prober.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Number of consecutive failures before marking a dependency down.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking a dependency up.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            timeout_ms: 1000,
            unhealthy_threshold: 1,
            healthy_threshold: 1,
        }
    }
}

/// What to do with a new request when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new request; the caller is told to retry later.
    RejectNew,
    /// Dead-letter the oldest queued request to make room.
    DropOldest,
}

/// What to do with a queued request whose replay fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Put it back at the head of the queue, up to `max_replays` times.
    Requeue,
    /// Hand it to the dead-letter channel immediately.
    DeadLetter,
}

/// Request queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued requests.
    pub max_size: usize,

    /// Maximum age of a queued request in seconds (0 disables expiry).
    pub max_age_secs: u64,

    pub overflow: OverflowPolicy,

    pub on_failure: FailurePolicy,

    /// Replays allowed under `FailurePolicy::Requeue` before dead-lettering.
    pub max_replays: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_age_secs: 300,
            overflow: OverflowPolicy::RejectNew,
            on_failure: FailurePolicy::Requeue,
            max_replays: 3,
        }
    }
}

impl QueueConfig {
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
