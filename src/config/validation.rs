//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status codes, depth, timeouts)
//! - Check that addresses, URLs and levels parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::Level;
use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    for (name, code) in &config.faults.statuses {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("faults.statuses", "empty failure type name"));
        }
        if StatusCode::from_u16(*code).is_err() {
            errors.push(ValidationError::new(
                format!("faults.statuses.{}", name),
                format!("{} is not a valid status code", code),
            ));
        }
    }

    if config.faults.max_chain_depth == 0 {
        errors.push(ValidationError::new("faults.max_chain_depth", "must be greater than 0"));
    }

    if config.traffic.level.parse::<Level>().is_err() {
        errors.push(ValidationError::new(
            "traffic.level",
            format!("unknown level '{}'", config.traffic.level),
        ));
    }

    if let Some(base_url) = &config.upstream.base_url {
        if let Err(e) = Url::parse(base_url) {
            errors.push(ValidationError::new("upstream.base_url", e.to_string()));
        }
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }

    if config.observability.log_level.parse::<Level>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.faults.statuses.insert("ValidationError".into(), 42);
        config.faults.max_chain_depth = 0;
        config.traffic.level = "loud".into();
        config.upstream.base_url = Some("not a url".into());
        config.upstream.timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "listener.bind_address",
                "faults.statuses.ValidationError",
                "faults.max_chain_depth",
                "traffic.level",
                "upstream.base_url",
                "upstream.timeout_secs",
            ]
        );
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ServiceConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);
    }
}
