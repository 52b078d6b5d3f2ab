//! Error Types for the Tuning Engine
//!
//! ## Design Philosophy
//!
//! Two failure domains, two error types:
//!
//! 1. **`ConfigError`**: malformed configuration. Always fatal at startup:
//!    a session must never begin tuning a live coefficient against an
//!    invalid specification, so these are surfaced before the connector is
//!    even opened.
//!
//! 2. **`TelemetryError`**: connector-side failures (unreachable server,
//!    timed-out write). Always recoverable from the orchestrator's point of
//!    view: it retries at a throttled interval and writes nothing while
//!    disconnected.
//!
//! Rejected shot readings are deliberately *not* errors. They are an
//! expected part of operating against a noisy bus and are modeled as a
//! [`ShotRejection`](crate::validator::ShotRejection) value instead.

use thiserror::Error;

/// Fatal configuration problems detected before a session starts
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A coefficient's bounds are inverted or empty
    #[error("{name}: min_value {min} must be < max_value {max}")]
    InvalidBounds {
        /// Coefficient name
        name: String,
        /// Configured lower bound
        min: f64,
        /// Configured upper bound
        max: f64,
    },

    /// A coefficient's default lies outside its bounds
    #[error("{name}: default {default} outside [{min}, {max}]")]
    DefaultOutOfRange {
        /// Coefficient name
        name: String,
        /// Configured default
        default: f64,
        /// Configured lower bound
        min: f64,
        /// Configured upper bound
        max: f64,
    },

    /// A coefficient's initial step size is not positive
    #[error("{name}: initial_step_size must be positive")]
    NonPositiveStep {
        /// Coefficient name
        name: String,
    },

    /// A coefficient's step decay rate is outside (0, 1]
    #[error("{name}: step_decay_rate {rate} must be in (0, 1]")]
    InvalidDecayRate {
        /// Coefficient name
        name: String,
        /// Configured decay rate
        rate: f64,
    },

    /// The tuning order names a coefficient that is not registered
    #[error("tuning order entry '{name}' is not a registered coefficient")]
    UnknownCoefficient {
        /// The unregistered name
        name: String,
    },

    /// A system-wide parameter is out of range
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Recoverable telemetry connector failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelemetryError {
    /// Connection could not be established within the bounded window
    #[error("connect to {address} failed: {reason}")]
    ConnectFailed {
        /// Server address that was attempted
        address: String,
        /// Short failure description
        reason: String,
    },

    /// An operation was attempted while disconnected
    #[error("not connected")]
    NotConnected,

    /// A bounded read or write exceeded its timeout
    #[error("operation timed out")]
    Timeout,

    /// The remote end replied with something unparseable
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_render() {
        let err = ConfigError::InvalidBounds {
            name: "kDragCoefficient".into(),
            min: 0.006,
            max: 0.001,
        };
        assert!(err.to_string().contains("kDragCoefficient"));
        assert!(err.to_string().contains("0.006"));
    }

    #[test]
    fn telemetry_errors_render() {
        let err = TelemetryError::ConnectFailed {
            address: "10.12.34.2".into(),
            reason: "refused".into(),
        };
        assert!(err.to_string().contains("10.12.34.2"));
    }
}
