//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that header-bound values can be sent on the wire
//! - Validate value ranges (port non-zero, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use hyper::header::HeaderValue;

use crate::config::schema::{ClientConfig, Settings};

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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate the client section alone.
pub fn validate_client(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.host.trim().is_empty() {
        errors.push(ValidationError::new("client.host", "must not be empty"));
    } else if HeaderValue::from_str(&config.host).is_err() || config.host.contains(' ') {
        errors.push(ValidationError::new(
            "client.host",
            format!("'{}' is not a valid host name", config.host),
        ));
    }

    if config.port == 0 {
        errors.push(ValidationError::new("client.port", "must not be 0"));
    }

    if HeaderValue::from_str(&config.user_agent).is_err() {
        errors.push(ValidationError::new(
            "client.user_agent",
            "contains characters not allowed in a header value",
        ));
    }

    if HeaderValue::from_str(&config.accept).is_err() {
        errors.push(ValidationError::new(
            "client.accept",
            "contains characters not allowed in a header value",
        ));
    }

    if config.max_response_bytes == 0 {
        errors.push(ValidationError::new("client.max_response_bytes", "must not be 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a whole settings file.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_client(&settings.client).err().unwrap_or_default();

    if settings.metrics.enabled && settings.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("'{}' is not a socket address", settings.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
