//! Tuner configuration
//!
//! One immutable [`TunerConfig`] value, built once at startup, passed by
//! reference into every component. Nothing mutates it afterwards, so a
//! session's behavior is fully reproducible from its configuration alone.
//! [`TunerConfig::validate`] runs before any connection attempt; a session
//! must never begin tuning a live coefficient against a malformed
//! specification, so every violation here is fatal.

use serde::{Deserialize, Serialize};

use crate::coefficients::{default_registry, default_tuning_order, CoefficientSpec};
use crate::errors::ConfigError;
use crate::loss::LossConfig;
use crate::optimizer::TunerLimits;

/// Complete configuration for a tuning session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Master enable; a disabled tuner exits before connecting
    pub enabled: bool,

    /// Team identifier used to derive the server address; 0 means
    /// unconfigured
    pub team_number: u32,

    /// Explicit server address; overrides team-number derivation when set
    pub server_address: Option<String>,

    /// Poll rate of the control loop, ticks per second
    pub poll_hz: f64,

    /// Quasi-random warm-up proposals before acquisition-driven search
    pub n_initial_points: usize,

    /// Maximum optimization iterations per coefficient
    pub n_calls_per_coefficient: usize,

    /// Observations required before a converged phase may commit
    pub min_valid_shots: usize,

    /// Consecutive invalid readings that abort a phase
    pub max_consecutive_invalid: usize,

    /// Outlier gate width in standard deviations
    pub outlier_threshold_sigma: f64,

    /// Accepted samples required before the outlier gate activates
    pub min_samples_for_stats: usize,

    /// Readings closer together than this are treated as re-reads, ms
    pub debounce_ms: u64,

    /// Whether the exploration step decays toward its floor
    pub step_decay_enabled: bool,

    /// Step floor as a ratio of each coefficient's initial step
    pub min_step_ratio: f64,

    /// Throttle between connection attempts, ms
    pub reconnect_delay_ms: u64,

    /// Bound on a single connection attempt, ms
    pub connect_timeout_ms: u64,

    /// Graceful-shutdown window after cancellation, ms
    pub graceful_shutdown_ms: u64,

    /// Loss-function weights
    pub loss: LossConfig,

    /// The coefficient registry
    pub coefficients: Vec<CoefficientSpec>,

    /// Names in tuning order; disabled entries are skipped, order is fixed
    pub tuning_order: Vec<String>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            team_number: 0,
            server_address: None,
            poll_hz: 10.0,
            n_initial_points: 5,
            n_calls_per_coefficient: 20,
            min_valid_shots: 3,
            max_consecutive_invalid: 5,
            outlier_threshold_sigma: 3.0,
            min_samples_for_stats: 5,
            debounce_ms: 500,
            step_decay_enabled: true,
            min_step_ratio: 0.1,
            reconnect_delay_ms: 2_000,
            connect_timeout_ms: 5_000,
            graceful_shutdown_ms: 5_000,
            loss: LossConfig::default(),
            coefficients: default_registry(),
            tuning_order: default_tuning_order(),
        }
    }
}

impl TunerConfig {
    /// Validate the whole configuration; any violation is fatal at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        for spec in &self.coefficients {
            spec.validate()?;
        }

        for name in &self.tuning_order {
            if !self.coefficients.iter().any(|c| &c.name == name) {
                return Err(ConfigError::UnknownCoefficient { name: name.clone() });
            }
        }

        if self.n_initial_points < 1 {
            return Err(ConfigError::InvalidParameter {
                reason: "n_initial_points must be >= 1",
            });
        }

        if self.n_calls_per_coefficient < self.n_initial_points {
            return Err(ConfigError::InvalidParameter {
                reason: "n_calls_per_coefficient must be >= n_initial_points",
            });
        }

        if self.min_valid_shots < 1 {
            return Err(ConfigError::InvalidParameter {
                reason: "min_valid_shots must be >= 1",
            });
        }

        // Zero would abort every phase before its first shot
        if self.max_consecutive_invalid < 1 {
            return Err(ConfigError::InvalidParameter {
                reason: "max_consecutive_invalid must be >= 1",
            });
        }

        if !(self.poll_hz > 0.0) {
            return Err(ConfigError::InvalidParameter {
                reason: "poll_hz must be positive",
            });
        }

        if !(self.outlier_threshold_sigma > 0.0) {
            return Err(ConfigError::InvalidParameter {
                reason: "outlier_threshold_sigma must be positive",
            });
        }

        if self.min_step_ratio <= 0.0 || self.min_step_ratio > 1.0 {
            return Err(ConfigError::InvalidParameter {
                reason: "min_step_ratio must be in (0, 1]",
            });
        }

        Ok(())
    }

    /// The server address this configuration resolves to
    pub fn resolve_address(&self) -> String {
        match &self.server_address {
            Some(addr) => addr.clone(),
            None => crate::telemetry::team_server_address(self.team_number),
        }
    }

    /// Enabled coefficients in tuning order
    pub fn enabled_in_order(&self) -> Vec<CoefficientSpec> {
        self.tuning_order
            .iter()
            .filter_map(|name| self.coefficients.iter().find(|c| &c.name == name))
            .filter(|c| c.enabled)
            .cloned()
            .collect()
    }

    /// The per-phase limits handed to each coefficient tuner
    pub fn tuner_limits(&self) -> TunerLimits {
        TunerLimits {
            n_calls: self.n_calls_per_coefficient,
            min_valid_shots: self.min_valid_shots,
            max_consecutive_invalid: self.max_consecutive_invalid,
            step_decay_enabled: self.step_decay_enabled,
            min_step_ratio: self.min_step_ratio,
        }
    }

    /// Poll period implied by `poll_hz`, in milliseconds
    pub fn poll_period_ms(&self) -> u64 {
        (1_000.0 / self.poll_hz).round().max(1.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        TunerConfig::default().validate().unwrap();
    }

    #[test]
    fn unknown_tuning_order_entry_is_fatal() {
        let mut cfg = TunerConfig::default();
        cfg.tuning_order.push("kImaginary".into());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownCoefficient { .. })
        ));
    }

    #[test]
    fn inverted_coefficient_bounds_are_fatal() {
        let mut cfg = TunerConfig::default();
        cfg.coefficients[0].min_value = 10.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn budget_below_warmup_is_fatal() {
        let cfg = TunerConfig {
            n_calls_per_coefficient: 3,
            n_initial_points: 5,
            ..TunerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn zero_shot_budgets_are_fatal() {
        let cfg = TunerConfig {
            min_valid_shots: 0,
            ..TunerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidParameter { .. })
        ));

        let cfg = TunerConfig {
            max_consecutive_invalid: 0,
            ..TunerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn non_positive_poll_rate_is_fatal() {
        let cfg = TunerConfig {
            poll_hz: 0.0,
            ..TunerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn address_resolution() {
        let cfg = TunerConfig {
            team_number: 1234,
            ..TunerConfig::default()
        };
        assert_eq!(cfg.resolve_address(), "10.12.34.2");

        let cfg = TunerConfig {
            team_number: 1234,
            server_address: Some("192.168.1.5".into()),
            ..TunerConfig::default()
        };
        assert_eq!(cfg.resolve_address(), "192.168.1.5");

        assert_eq!(TunerConfig::default().resolve_address(), "127.0.0.1");
    }

    #[test]
    fn enabled_in_order_skips_disabled() {
        let cfg = TunerConfig::default();
        let names: Vec<_> = cfg.enabled_in_order().iter().map(|c| c.name.clone()).collect();

        // kAirDensity is registered but disabled by default
        assert!(!names.contains(&"kAirDensity".to_string()));
        assert_eq!(names[0], "kDragCoefficient");
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn poll_period() {
        assert_eq!(TunerConfig::default().poll_period_ms(), 100);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = TunerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TunerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
