use std::net::SocketAddr;

use eyre::Result;

use crate::config::models::{BodyLimitConfig, InspectionConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.upstream.url.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "upstream.url".to_string(),
            });
        } else if let Err(e) = Self::validate_url(&config.upstream.url, "upstream.url") {
            errors.push(e);
        }

        if let Err(e) = Self::validate_timeout(&config.upstream.timeout) {
            errors.push(e);
        }

        if let Some(origin) = &config.public_origin {
            if let Err(e) = Self::validate_url(origin, "public_origin") {
                errors.push(e);
            }
        }

        if let Err(mut limit_errors) = Self::validate_limits(&config.limits) {
            errors.append(&mut limit_errors);
        }

        if let Err(mut inspection_errors) = Self::validate_inspection(&config.inspection) {
            errors.append(&mut inspection_errors);
        }

        if let Some(endpoint) = &config.metrics.otlp_endpoint {
            if let Err(e) = Self::validate_url(endpoint, "metrics.otlp_endpoint") {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate an http(s) URL with a host
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_timeout(timeout: &str) -> ValidationResult<()> {
        match humantime::parse_duration(timeout) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: "upstream.timeout".to_string(),
                message: "Timeout must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: "upstream.timeout".to_string(),
                message: format!("Invalid duration '{timeout}': {e}"),
            }),
        }
    }

    fn validate_limits(limits: &BodyLimitConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if limits.max_request_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_request_body_bytes".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }
        if limits.max_response_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_response_body_bytes".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_inspection(inspection: &InspectionConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !inspection.builtin_signatures && inspection.directives.is_empty() {
            tracing::warn!("No inspection rules configured; traffic will only be relayed");
        }

        for (i, source) in inspection.directives.iter().enumerate() {
            if !std::path::Path::new(source).is_file() {
                errors.push(ValidationError::InvalidField {
                    field: format!("inspection.directives[{i}]"),
                    message: format!("Directive source '{source}' does not exist"),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
