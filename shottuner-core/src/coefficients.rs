//! Tunable coefficient registry
//!
//! Each coefficient of the firing-solution model is described by an
//! immutable [`CoefficientSpec`]: bounds, default, exploration step, decay
//! rate, integer flag, enable flag, and the telemetry key it is published
//! under. The registry is static data: nothing here mutates at runtime,
//! and every value an optimizer ever proposes or commits passes through
//! [`CoefficientSpec::clamp`] on its way out.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Immutable definition of one tunable coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSpec {
    /// Registry name, e.g. `kDragCoefficient`
    pub name: String,

    /// Value used before tuning and as the abort fallback
    pub default_value: f64,

    /// Lower safety bound
    pub min_value: f64,

    /// Upper safety bound
    pub max_value: f64,

    /// Initial exploration step size
    pub initial_step_size: f64,

    /// Multiplicative step shrink per observation, in (0, 1]
    pub step_decay_rate: f64,

    /// Whether proposals must be whole numbers (e.g. iteration counts)
    pub is_integer: bool,

    /// Whether this coefficient participates in tuning
    pub enabled: bool,

    /// Telemetry key the committed value is written to
    pub key: String,
}

impl CoefficientSpec {
    /// Clamp a candidate value into this coefficient's valid domain
    ///
    /// Integer coefficients are rounded to the nearest whole number first,
    /// then clamped, so the result is always inside `[min_value, max_value]`
    /// even when rounding at a boundary would step outside it.
    pub fn clamp(&self, value: f64) -> f64 {
        let v = if self.is_integer { value.round() } else { value };
        v.clamp(self.min_value, self.max_value)
    }

    /// Validate the spec's own invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_value >= self.max_value {
            return Err(ConfigError::InvalidBounds {
                name: self.name.clone(),
                min: self.min_value,
                max: self.max_value,
            });
        }

        if self.default_value < self.min_value || self.default_value > self.max_value {
            return Err(ConfigError::DefaultOutOfRange {
                name: self.name.clone(),
                default: self.default_value,
                min: self.min_value,
                max: self.max_value,
            });
        }

        if self.initial_step_size <= 0.0 {
            return Err(ConfigError::NonPositiveStep {
                name: self.name.clone(),
            });
        }

        if self.step_decay_rate <= 0.0 || self.step_decay_rate > 1.0 {
            return Err(ConfigError::InvalidDecayRate {
                name: self.name.clone(),
                rate: self.step_decay_rate,
            });
        }

        Ok(())
    }
}

/// The default tuning order for the firing-solution model
pub fn default_tuning_order() -> Vec<String> {
    [
        "kDragCoefficient",
        "kAirDensity",
        "kVelocityIterationCount",
        "kAngleIterationCount",
        "kVelocityTolerance",
        "kAngleTolerance",
        "kLaunchHeight",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// The default coefficient registry for the firing-solution model
///
/// Bounds are safety limits: a committed value can never leave them no
/// matter what the optimizer proposes or what a bad reading suggests.
pub fn default_registry() -> Vec<CoefficientSpec> {
    vec![
        CoefficientSpec {
            name: "kDragCoefficient".into(),
            default_value: 0.003,
            min_value: 0.001,
            max_value: 0.006,
            initial_step_size: 0.001,
            step_decay_rate: 0.9,
            is_integer: false,
            enabled: true,
            key: "/Tuning/FiringSolver/DragCoefficient".into(),
        },
        CoefficientSpec {
            name: "kAirDensity".into(),
            default_value: 1.225,
            min_value: 1.10,
            max_value: 1.30,
            initial_step_size: 0.05,
            step_decay_rate: 0.9,
            is_integer: false,
            // The solver treats air density as the 1.225 constant
            enabled: false,
            key: "/Tuning/FiringSolver/AirDensity".into(),
        },
        CoefficientSpec {
            name: "kVelocityIterationCount".into(),
            default_value: 20.0,
            min_value: 10.0,
            max_value: 50.0,
            initial_step_size: 5.0,
            step_decay_rate: 0.85,
            is_integer: true,
            enabled: true,
            key: "/Tuning/FiringSolver/VelocityIterations".into(),
        },
        CoefficientSpec {
            name: "kAngleIterationCount".into(),
            default_value: 20.0,
            min_value: 10.0,
            max_value: 50.0,
            initial_step_size: 5.0,
            step_decay_rate: 0.85,
            is_integer: true,
            enabled: true,
            key: "/Tuning/FiringSolver/AngleIterations".into(),
        },
        CoefficientSpec {
            name: "kVelocityTolerance".into(),
            default_value: 0.01,
            min_value: 0.005,
            max_value: 0.05,
            initial_step_size: 0.005,
            step_decay_rate: 0.9,
            is_integer: false,
            enabled: true,
            key: "/Tuning/FiringSolver/VelocityTolerance".into(),
        },
        CoefficientSpec {
            name: "kAngleTolerance".into(),
            default_value: 0.0001,
            min_value: 0.00001,
            max_value: 0.001,
            initial_step_size: 0.0001,
            step_decay_rate: 0.9,
            is_integer: false,
            enabled: true,
            key: "/Tuning/FiringSolver/AngleTolerance".into(),
        },
        CoefficientSpec {
            name: "kLaunchHeight".into(),
            default_value: 0.8,
            min_value: 0.75,
            max_value: 0.85,
            initial_step_size: 0.01,
            step_decay_rate: 0.9,
            is_integer: false,
            enabled: true,
            key: "/Tuning/FiringSolver/LaunchHeight".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drag() -> CoefficientSpec {
        default_registry()
            .into_iter()
            .find(|c| c.name == "kDragCoefficient")
            .unwrap()
    }

    fn iterations() -> CoefficientSpec {
        default_registry()
            .into_iter()
            .find(|c| c.name == "kVelocityIterationCount")
            .unwrap()
    }

    #[test]
    fn clamp_real_valued() {
        let c = drag();
        assert_eq!(c.clamp(0.0), 0.001);
        assert_eq!(c.clamp(1.0), 0.006);
        assert_eq!(c.clamp(0.004), 0.004);
    }

    #[test]
    fn clamp_integer_rounds_then_clamps() {
        let c = iterations();
        assert_eq!(c.clamp(24.4), 24.0);
        assert_eq!(c.clamp(24.6), 25.0);
        assert_eq!(c.clamp(9.4), 10.0); // rounds to 9, clamps up
        assert_eq!(c.clamp(50.7), 50.0);
    }

    #[test]
    fn default_registry_is_valid() {
        for spec in default_registry() {
            spec.validate().unwrap();
        }
    }

    #[test]
    fn tuning_order_covers_registry() {
        let order = default_tuning_order();
        for spec in default_registry() {
            assert!(order.contains(&spec.name), "missing {}", spec.name);
        }
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut c = drag();
        c.min_value = 1.0;
        c.max_value = 0.5;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));
    }

    proptest! {
        #[test]
        fn clamp_law_real(v in -1e6f64..1e6f64) {
            let c = drag();
            let clamped = c.clamp(v);
            prop_assert!(clamped >= c.min_value && clamped <= c.max_value);
        }

        #[test]
        fn clamp_law_integer(v in -1e6f64..1e6f64) {
            let c = iterations();
            let clamped = c.clamp(v);
            prop_assert!(clamped >= c.min_value && clamped <= c.max_value);
            prop_assert_eq!(clamped, clamped.round());
            // Inside the open interior, clamp is exactly round
            if v.round() > c.min_value && v.round() < c.max_value {
                prop_assert_eq!(clamped, v.round());
            }
        }
    }
}
