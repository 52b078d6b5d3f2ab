//! Shot Validator
//!
//! ## Overview
//!
//! Filters raw telemetry readings into accepted [`ShotObservation`]s. A bad
//! sensor reading must never reach the optimizer: a single absurd distance
//! fed into the surrogate model can drag a live coefficient toward a
//! dangerous value, so everything that looks wrong is dropped here.
//!
//! ## Checks, in order
//!
//! 1. **Structural**: every numeric field finite, `distance > 0`,
//!    `exit_velocity > 0`.
//! 2. **Debounce**: a reading counts as a new shot only if its timestamp
//!    exceeds the previously accepted one by more than the debounce
//!    interval (default 500 ms). Anything closer is assumed to be a stale
//!    re-read of the same shot still sitting on the bus and is dropped
//!    silently.
//! 3. **Statistical outlier gate**: once enough samples exist, a distance
//!    further than `threshold_sigma` standard deviations from the rolling
//!    mean is rejected.
//!
//! The validator owns nothing but its rolling statistics and never writes
//! to the telemetry bus. [`ShotValidator::reset`] is called at every
//! coefficient phase boundary so one phase's statistics cannot leak into
//! the next.

use log::{debug, trace};

use crate::clock::Timestamp;
use crate::shot::{RawShotReading, ShotObservation};
use crate::window::SampleWindow;

/// Capacity of the rolling distance window
pub const STATS_WINDOW: usize = 32;

/// Why a reading was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotRejection {
    /// A field was NaN or infinite
    NonFinite,
    /// `distance` or `exit_velocity` was not strictly positive
    NonPositive,
    /// Too close in time to the previously accepted reading; presumed to be
    /// the same shot read twice
    Duplicate,
    /// Distance deviated too far from the rolling distribution
    Outlier,
}

impl ShotRejection {
    /// Whether this rejection should count against the per-phase
    /// consecutive-invalid budget
    ///
    /// Duplicates are re-reads of a shot that was already counted, not
    /// evidence of a broken sensor, so they do not.
    pub fn counts_as_invalid(self) -> bool {
        !matches!(self, ShotRejection::Duplicate)
    }
}

/// Stateful filter from raw readings to accepted observations
#[derive(Debug, Clone)]
pub struct ShotValidator {
    debounce_ms: u64,
    threshold_sigma: f64,
    min_samples_for_stats: usize,
    last_accepted_at: Option<Timestamp>,
    distances: SampleWindow<STATS_WINDOW>,
}

impl ShotValidator {
    /// Create a validator
    ///
    /// `threshold_sigma` is the outlier gate width in standard deviations;
    /// `min_samples_for_stats` is how many accepted samples must exist
    /// before the gate activates.
    pub fn new(debounce_ms: u64, threshold_sigma: f64, min_samples_for_stats: usize) -> Self {
        Self {
            debounce_ms,
            threshold_sigma,
            min_samples_for_stats,
            last_accepted_at: None,
            distances: SampleWindow::new(),
        }
    }

    /// Validate one raw reading
    pub fn validate(&mut self, raw: &RawShotReading) -> Result<ShotObservation, ShotRejection> {
        if !raw.distance.is_finite() || !raw.angle.is_finite() || !raw.exit_velocity.is_finite() {
            debug!("rejecting shot reading: non-finite field");
            return Err(ShotRejection::NonFinite);
        }

        if raw.distance <= 0.0 || raw.exit_velocity <= 0.0 {
            debug!(
                "rejecting shot reading: distance {} / exit velocity {} not positive",
                raw.distance, raw.exit_velocity
            );
            return Err(ShotRejection::NonPositive);
        }

        if let Some(last) = self.last_accepted_at {
            if raw.observed_at <= last.saturating_add(self.debounce_ms) {
                trace!(
                    "dropping stale re-read at t={} (last accepted t={})",
                    raw.observed_at,
                    last
                );
                return Err(ShotRejection::Duplicate);
            }
        }

        if self.distances.len() >= self.min_samples_for_stats {
            // Window is non-empty here, so the statistics exist
            let mean = self.distances.mean().unwrap_or(raw.distance);
            let sigma = self.distances.std_dev().unwrap_or(0.0);

            // A flat window (sigma == 0) can't support a deviation test
            if sigma > 0.0 && (raw.distance - mean).abs() > self.threshold_sigma * sigma {
                debug!(
                    "rejecting shot reading: distance {:.3} outside {:.1} sigma of mean {:.3}",
                    raw.distance, self.threshold_sigma, mean
                );
                return Err(ShotRejection::Outlier);
            }
        }

        self.last_accepted_at = Some(raw.observed_at);
        self.distances.push(raw.distance);

        Ok(ShotObservation::from_raw(raw))
    }

    /// Clear debounce state and rolling statistics at a phase boundary
    pub fn reset(&mut self) {
        self.last_accepted_at = None;
        self.distances.clear();
    }
}
