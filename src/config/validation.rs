//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports non-zero, timeouts are numbers)
//! - Check the proxy section is complete for the selected type
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::proxy::ProxyConfig;
use crate::config::schema::ClientConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `proxy.address`.
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

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::new("server.host", "must not be empty"));
    }
    if config.server.port == Some(0) {
        errors.push(ValidationError::new("server.port", "must be non-zero"));
    }
    if let Some(secs) = config.server.timeout_secs {
        if secs.is_nan() {
            errors.push(ValidationError::new("server.timeout_secs", "must be a number"));
        }
    }

    match ProxyConfig::from_section(&config.proxy) {
        Ok(proxy) if !proxy.is_direct() => {
            if proxy.address.trim().is_empty() {
                errors.push(ValidationError::new(
                    "proxy.address",
                    format!("required for {} proxies", proxy.proxy_type),
                ));
            }
            if proxy.port == 0 {
                errors.push(ValidationError::new("proxy.port", "must be non-zero"));
            }
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("proxy", e.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
