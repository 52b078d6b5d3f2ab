//! Loss function: shot outcome → scalar to minimize
//!
//! The optimizer contract only requires that lower loss means a better
//! outcome and that the mapping is deterministic given the observation.
//! The weighting here is itself tunable through [`LossConfig`]:
//!
//! ```text
//! loss = miss_weight * miss_term + reference_weight * ref_term
//!
//! miss_term = 0                              on a hit
//!           = 1 + distance / ref_distance    on a miss
//! ref_term  = |v_exit - v_ref| / v_ref       when a reference velocity
//!                                            is configured, else 0
//! ```
//!
//! A miss at longer range implies a larger trajectory error, hence the
//! distance scaling; the reference term penalizes drifting away from a
//! known-good exit velocity when one is available.

use serde::{Deserialize, Serialize};

use crate::shot::ShotObservation;

/// Weights for the shot loss function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    /// Weight of the miss penalty term
    pub miss_weight: f64,
    /// Weight of the reference-deviation term
    pub reference_weight: f64,
    /// Distance that normalizes the miss penalty
    pub reference_distance: f64,
    /// Known-good exit velocity, when one exists
    pub reference_velocity: Option<f64>,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            miss_weight: 1.0,
            reference_weight: 0.25,
            reference_distance: 5.0,
            reference_velocity: None,
        }
    }
}

impl LossConfig {
    /// Compute the loss for one observation; lower is better
    pub fn loss(&self, obs: &ShotObservation) -> f64 {
        let miss_term = if obs.hit {
            0.0
        } else {
            1.0 + obs.distance / self.reference_distance
        };

        let ref_term = match self.reference_velocity {
            Some(v_ref) if v_ref > 0.0 => (obs.exit_velocity - v_ref).abs() / v_ref,
            _ => 0.0,
        };

        self.miss_weight * miss_term + self.reference_weight * ref_term
    }
}
