//! Tuning engine for ShotTuner
//!
//! Tunes the scalar coefficients of a projectile firing-solution solver by
//! watching live shot outcomes on a telemetry bus and running a bounded,
//! per-coefficient Bayesian-optimization loop over them.
//!
//! Key guarantees:
//! - Every committed value is clamped into its coefficient's safety bounds
//! - Bad readings are filtered before they can touch the optimizer
//! - Exploration decays so coefficients converge rather than oscillate
//! - Match mode, disconnects, and cancellation suspend or end the session
//!   without corrupting state
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use shottuner_core::{Orchestrator, TunerConfig, InMemoryConnector};
//!
//! let config = TunerConfig::default();
//! let mut orchestrator = Orchestrator::new(config).unwrap();
//!
//! let mut connector = InMemoryConnector::new();
//! let cancel = AtomicBool::new(false);
//! orchestrator.run(&mut connector, &cancel);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod coefficients;
pub mod config;
pub mod errors;
pub mod loss;
pub mod optimizer;
pub mod session;
pub mod shot;
pub mod status;
pub mod telemetry;
pub mod validator;
pub mod window;

// Public API
pub use clock::{Clock, FixedClock, SystemClock, Timestamp};
pub use coefficients::CoefficientSpec;
pub use config::TunerConfig;
pub use errors::{ConfigError, TelemetryError};
pub use loss::LossConfig;
pub use optimizer::{CoefficientTuner, ExpectedImprovement, PhaseOutcome, ScalarOptimizer};
pub use session::{Orchestrator, Phase, TuningSession};
pub use shot::{RawShotReading, ShotObservation};
pub use telemetry::{team_server_address, InMemoryConnector, TelemetryConnector};
pub use validator::{ShotRejection, ShotValidator};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
