//! Configuration validation.
//!
//! Semantic checks on an already-deserialized config; collects all
//! problems instead of stopping at the first.

use std::fmt;
use std::net::SocketAddr;

use axum::http::Uri;

use super::schema::RelayConfig;

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address".to_string(),
            message: format!("not a socket address: {}", config.listener.bind_address),
        });
    }

    if config.relay.root.is_empty() {
        errors.push(ValidationError {
            field: "relay.root".to_string(),
            message: "root domain must not be empty".to_string(),
        });
    }

    if config.relay.ping_interval_secs == 0 {
        errors.push(ValidationError {
            field: "relay.ping_interval_secs".to_string(),
            message: "ping interval must be at least 1 second".to_string(),
        });
    }

    if let Some(index) = &config.http.index {
        match index.parse::<Uri>() {
            Ok(uri) if uri.authority().is_some() => {}
            _ => errors.push(ValidationError {
                field: "http.index".to_string(),
                message: format!("not an absolute URL: {index}"),
            }),
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address".to_string(),
            message: format!(
                "not a socket address: {}",
                config.observability.metrics_address
            ),
        });
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
    fn test_default_config_is_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "nonsense".to_string();
        config.relay.root = String::new();
        config.relay.ping_interval_secs = 0;
        config.http.index = Some("not a url".to_string());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
