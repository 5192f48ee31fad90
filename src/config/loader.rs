//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::fault::FaultError;

/// Setup-time failures. None of these are deferred to first use.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid fault status: {0}")]
    Fault(#[from] FaultError),

    #[error("no transport configured")]
    MissingTransport,

    #[error("no upstream configured")]
    MissingUpstream,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_syntax_error() {
        let err = parse_config("[listener\nbind_address = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors_are_listed() {
        let err = parse_config("[faults]\nmax_chain_depth = 0\n[upstream]\ntimeout_secs = 0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: faults.max_chain_depth: must be greater than 0, \
             upstream.timeout_secs: must be greater than 0"
        );
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("faultline-config-{}.toml", std::process::id()));
        fs::write(&path, "[listener]\nbind_address = \"127.0.0.1:9000\"\n").unwrap();
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
    }
}
