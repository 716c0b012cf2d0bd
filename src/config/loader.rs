//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::EdgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EdgeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: EdgeConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load from `path` when given (defaults otherwise), apply environment
/// overrides, then validate the result.
pub fn load(path: Option<&Path>) -> Result<EdgeConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => EdgeConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay deployment-time settings. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut EdgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("EDGE_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = get("EDGE_UPSTREAM_URL") {
        config.upstream.base_url = v;
    }
    if let Some(v) = get("EDGE_REDIS_URL") {
        config.store.redis_url = Some(v);
    }
    if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
        config.cors.allowed_origins = v;
    }
    if let Some(v) = get("CORS_ALLOWED_METHODS") {
        config.cors.allowed_methods = v;
    }
    if let Some(v) = get("CORS_ALLOWED_HEADERS") {
        config.cors.allowed_headers = v;
    }
    if let Some(v) = get("RATE_LIMIT_ENABLED") {
        match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => config.rate_limit.enabled = true,
            "false" | "0" | "no" => config.rate_limit.enabled = false,
            other => tracing::warn!(value = %other, "Ignoring unrecognized RATE_LIMIT_ENABLED"),
        }
    }
}
