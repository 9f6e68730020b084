//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, intervals finite and > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{ServerConfig, SocketOption};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Host must not be empty.
    #[error("host must not be empty")]
    EmptyHost,

    /// A count that must be positive was zero.
    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },

    /// A duration in seconds was zero, negative, or not finite.
    #[error("{field} must be a positive number of seconds, got {value}")]
    InvalidSeconds { field: &'static str, value: f64 },

    /// A socket option carries a value the OS would reject.
    #[error("socket option {option} has an invalid value")]
    InvalidSocketOption { option: SocketOption },
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if config.connection_limit == 0 {
        errors.push(ValidationError::Zero { field: "connection_limit" });
    }
    if config.threads == 0 {
        errors.push(ValidationError::Zero { field: "threads" });
    }

    let seconds = [
        ("cleanup_interval", config.cleanup_interval),
        ("channel_timeout", config.channel_timeout),
        ("poll_timeout", config.poll_timeout),
        ("shutdown_timeout", config.shutdown_timeout),
    ];
    for (field, value) in seconds {
        // Duration::from_secs_f64 panics on values it cannot represent.
        if !(value.is_finite() && value > 0.0 && value < u32::MAX as f64) {
            errors.push(ValidationError::InvalidSeconds { field, value });
        }
    }

    for option in &config.socket_options {
        let valid = match option {
            SocketOption::RecvBufferSize(size) | SocketOption::SendBufferSize(size) => *size > 0,
            _ => true,
        };
        if !valid {
            errors.push(ValidationError::InvalidSocketOption { option: *option });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
