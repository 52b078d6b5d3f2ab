//! Shot outcome data
//!
//! Two shapes, one conversion: [`RawShotReading`] is whatever came off the
//! telemetry bus this tick, trusted no further than its field types.
//! [`ShotObservation`] is a reading that survived the
//! [`ShotValidator`](crate::validator::ShotValidator) and may be fed to the
//! active optimizer. Observations are immutable once created and are
//! dropped after the optimizer consumes them; there is no shot history
//! beyond what the optimizer keeps for its own surrogate model.

use crate::clock::Timestamp;

/// Unvalidated shot outcome as read from the telemetry bus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawShotReading {
    /// Whether the shot hit the target
    pub hit: bool,
    /// Measured distance to target
    pub distance: f64,
    /// Solved launch angle (radians)
    pub angle: f64,
    /// Solved exit velocity
    pub exit_velocity: f64,
    /// When the reading was taken, milliseconds
    pub observed_at: Timestamp,
}

/// One validated real-world shot outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotObservation {
    /// Whether the shot hit the target
    pub hit: bool,
    /// Measured distance to target, strictly positive
    pub distance: f64,
    /// Solved launch angle (radians)
    pub angle: f64,
    /// Solved exit velocity, strictly positive
    pub exit_velocity: f64,
    /// When the reading was taken, milliseconds
    pub observed_at: Timestamp,
}

impl ShotObservation {
    /// Build an observation from a reading that already passed validation
    pub(crate) fn from_raw(raw: &RawShotReading) -> Self {
        Self {
            hit: raw.hit,
            distance: raw.distance,
            angle: raw.angle,
            exit_velocity: raw.exit_velocity,
            observed_at: raw.observed_at,
        }
    }
}
