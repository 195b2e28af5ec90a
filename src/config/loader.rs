//! Configuration loading from disk and the environment.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value '{}' for environment variable {}", value, var)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Build the effective configuration: file (or defaults), then environment
/// overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` abstracts the environment so tests need not mutate the process env.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("ITEM_GATEWAY_BIND") {
        config.gateway.bind_address = v;
    }
    if let Some(v) = lookup("ITEM_BACKEND_BIND") {
        config.backend.bind_address = v;
    }
    if let Some(v) = lookup("ITEM_BACKEND_URL") {
        config.backend.url = v;
    }
    if let Some(v) = lookup("ITEM_STORE_PATH") {
        config.backend.persistence_path = Some(v);
    }
    if let Some(v) = lookup("ITEM_LOG_LEVEL") {
        config.observability.log_level = v;
    }

    override_parsed(&lookup, "ITEM_RETRY_MAX_ATTEMPTS", &mut config.retries.max_attempts)?;
    override_parsed(
        &lookup,
        "ITEM_CIRCUIT_FAILURE_THRESHOLD",
        &mut config.circuit_breaker.failure_threshold,
    )?;
    override_parsed(
        &lookup,
        "ITEM_CIRCUIT_RESET_SECS",
        &mut config.circuit_breaker.reset_timeout_secs,
    )?;
    override_parsed(
        &lookup,
        "ITEM_HEALTH_INTERVAL_SECS",
        &mut config.health_check.interval_secs,
    )?;
    override_parsed(&lookup, "ITEM_QUEUE_MAX_SIZE", &mut config.queue.max_size)?;
    override_parsed(&lookup, "ITEM_QUEUE_MAX_AGE_SECS", &mut config.queue.max_age_secs)?;

    Ok(())
}

fn override_parsed<F, T>(lookup: &F, var: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackoffKind, OverflowPolicy};
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [circuit_breaker]
            failure_threshold = 5

            [retries]
            backoff = "linear"

            [queue]
            overflow = "drop_oldest"
            "#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 6);
        assert_eq!(config.retries.backoff, BackoffKind::Linear);
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.queue.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ITEM_BACKEND_URL", "http://backend:50051"),
            ("ITEM_RETRY_MAX_ATTEMPTS", "5"),
            ("ITEM_QUEUE_MAX_SIZE", " 10 "),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.backend.url, "http://backend:50051");
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.queue.max_size, 10);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = ServiceConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "ITEM_CIRCUIT_RESET_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();

        assert!(matches!(err, ConfigError::Env { var: "ITEM_CIRCUIT_RESET_SECS", .. }));
    }
}
