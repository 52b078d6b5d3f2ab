//! Per-Coefficient Black-Box Optimizer
//!
//! ## Overview
//!
//! Two layers, split along the contract boundary:
//!
//! - [`ScalarOptimizer`] is the minimal black-box interface: propose a
//!   candidate, observe its loss, report the best pair seen. Anything
//!   satisfying it can drive a coefficient: the bundled
//!   [`ExpectedImprovement`] strategy, a coordinate-descent fallback, or a
//!   test stub.
//! - [`CoefficientTuner`] wraps a strategy with everything the tuning
//!   engine guarantees regardless of strategy: clamping every proposal into
//!   the coefficient's bounds (and rounding integer coefficients),
//!   multiplicative step-size decay with a floor, the consecutive-invalid
//!   budget, and the phase termination rules.
//!
//! ## Search behavior
//!
//! `ExpectedImprovement` spends its first `n_initial_points` proposals on a
//! golden-ratio additive recurrence over the domain, a low-discrepancy
//! sequence that gives the surrogate unbiased initial coverage without a
//! random number generator, which keeps every run reproducible. After
//! warm-up it maximizes the Expected Improvement acquisition over a fixed
//! candidate grid, using an RBF-weighted surrogate whose kernel length
//! scale follows the decaying step size: as confidence grows the model
//! sharpens and exploration contracts instead of oscillating.
//!
//! ## Ownership
//!
//! A `CoefficientTuner` lives exactly as long as one coefficient's tuning
//! phase. It is dropped, never reused, when the phase converges, exhausts
//! its iteration budget, or aborts, so no optimizer state can leak between
//! coefficients.

use log::debug;

use crate::coefficients::CoefficientSpec;

/// Fractional part of the golden ratio, the additive-recurrence stride
const GOLDEN_FRAC: f64 = 0.618_033_988_749_894_9;

/// Candidate grid resolution for acquisition maximization
const ACQUISITION_GRID: usize = 128;

/// Minimal contract for a stateful black-box scalar optimizer
pub trait ScalarOptimizer {
    /// Next candidate value to evaluate
    fn propose(&mut self) -> f64;

    /// Record the loss observed at a candidate
    fn observe(&mut self, value: f64, loss: f64);

    /// Best `(value, loss)` pair observed so far
    fn best(&self) -> Option<(f64, f64)>;

    /// Hint the current exploration scale to the strategy
    ///
    /// Called by the driver as the step size decays. Strategies that do not
    /// model an exploration radius may ignore it.
    fn set_exploration_scale(&mut self, _scale: f64) {}
}

/// Expected-Improvement strategy over a one-dimensional bounded domain
pub struct ExpectedImprovement {
    min: f64,
    max: f64,
    n_initial_points: usize,
    /// Kernel length scale; follows the driver's decaying step size
    length_scale: f64,
    /// (candidate, loss) pairs in observation order
    history: Vec<(f64, f64)>,
    best: Option<(f64, f64)>,
}

impl ExpectedImprovement {
    /// Create a strategy for the domain `[min, max]`
    ///
    /// `n_initial_points` quasi-random warm-up proposals precede the
    /// acquisition-driven phase. `initial_scale` seeds the kernel length
    /// scale until the driver hints otherwise.
    pub fn new(min: f64, max: f64, n_initial_points: usize, initial_scale: f64) -> Self {
        Self {
            min,
            max,
            n_initial_points: n_initial_points.max(1),
            length_scale: initial_scale.abs().max(f64::EPSILON),
            history: Vec::new(),
            best: None,
        }
    }

    /// Standard normal CDF
    fn norm_cdf(z: f64) -> f64 {
        0.5 * (1.0 + libm::erf(z / core::f64::consts::SQRT_2))
    }

    /// Standard normal PDF
    fn norm_pdf(z: f64) -> f64 {
        (-0.5 * z * z).exp() / (2.0 * core::f64::consts::PI).sqrt()
    }

    /// k-th warm-up point of the golden-ratio additive recurrence
    fn warmup_point(&self, k: usize) -> f64 {
        let u = (0.5 + GOLDEN_FRAC * k as f64).fract();
        self.min + u * (self.max - self.min)
    }

    /// Surrogate mean and uncertainty at `x`
    ///
    /// RBF-weighted mean of observed losses; uncertainty shrinks with the
    /// total kernel mass near `x`, so unexplored regions stay attractive.
    fn surrogate(&self, x: f64) -> (f64, f64) {
        let ell = self.length_scale;
        let mut mass = 0.0;
        let mut weighted = 0.0;

        for &(xi, yi) in &self.history {
            let d = (x - xi) / ell;
            let w = (-0.5 * d * d).exp();
            mass += w;
            weighted += w * yi;
        }

        let n = self.history.len() as f64;
        let mean_y = self.history.iter().map(|&(_, y)| y).sum::<f64>() / n;
        let spread = {
            let var = self
                .history
                .iter()
                .map(|&(_, y)| (y - mean_y) * (y - mean_y))
                .sum::<f64>()
                / n;
            var.sqrt()
        };

        let mu = if mass > 1e-12 {
            weighted / mass
        } else {
            mean_y
        };
        // Floor the uncertainty so EI never collapses to exactly zero and
        // ties still break toward unexplored territory
        let sigma = (spread.max(1e-9)) / (1.0 + mass).sqrt();

        (mu, sigma)
    }

    /// Expected improvement of candidate `x` over the incumbent loss
    fn expected_improvement(&self, x: f64, best_loss: f64) -> f64 {
        let (mu, sigma) = self.surrogate(x);
        let z = (best_loss - mu) / sigma;
        (best_loss - mu) * Self::norm_cdf(z) + sigma * Self::norm_pdf(z)
    }
}

impl ScalarOptimizer for ExpectedImprovement {
    fn propose(&mut self) -> f64 {
        let k = self.history.len();
        if k < self.n_initial_points {
            return self.warmup_point(k);
        }

        // best() is Some here: warm-up guarantees at least one observation
        let best_loss = self.best.map(|(_, y)| y).unwrap_or(f64::INFINITY);

        let span = self.max - self.min;
        let mut best_x = self.min;
        let mut best_ei = f64::NEG_INFINITY;

        for i in 0..=ACQUISITION_GRID {
            let x = self.min + span * i as f64 / ACQUISITION_GRID as f64;
            let ei = self.expected_improvement(x, best_loss);
            if ei > best_ei {
                best_ei = ei;
                best_x = x;
            }
        }

        best_x
    }

    fn observe(&mut self, value: f64, loss: f64) {
        self.history.push((value, loss));
        let improved = match self.best {
            Some((_, best_loss)) => loss < best_loss,
            None => true,
        };
        if improved {
            self.best = Some((value, loss));
        }
    }

    fn best(&self) -> Option<(f64, f64)> {
        self.best
    }

    fn set_exploration_scale(&mut self, scale: f64) {
        self.length_scale = scale.abs().max(f64::EPSILON);
    }
}

/// Why a coefficient's tuning phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Step size reached its floor with enough observations behind it
    Converged,
    /// Iteration budget spent; the best observed value is still committed
    Exhausted,
    /// Too many consecutive invalid readings; revert to the fallback value
    Aborted,
}

impl PhaseOutcome {
    /// Whether this outcome commits the best observed value
    pub fn is_success(self) -> bool {
        !matches!(self, PhaseOutcome::Aborted)
    }
}

/// Limits a [`CoefficientTuner`] enforces around any strategy
#[derive(Debug, Clone, Copy)]
pub struct TunerLimits {
    /// Maximum optimization iterations for the phase
    pub n_calls: usize,
    /// Observations required before a converged or cancelled phase may commit
    pub min_valid_shots: usize,
    /// Consecutive invalid readings that abort the phase
    pub max_consecutive_invalid: usize,
    /// Whether the exploration step decays at all
    pub step_decay_enabled: bool,
    /// Step floor as a ratio of the initial step size
    pub min_step_ratio: f64,
}

/// Drives one coefficient's tuning phase around a black-box strategy
///
/// Owns the phase's entire mutable state; constructed at phase start and
/// dropped at phase end.
pub struct CoefficientTuner {
    spec: CoefficientSpec,
    strategy: Box<dyn ScalarOptimizer + Send>,
    limits: TunerLimits,
    step_size: f64,
    step_floor: f64,
    iteration_count: usize,
    consecutive_invalid: usize,
    current_proposal: Option<f64>,
}

impl CoefficientTuner {
    /// Create a tuner with the bundled Expected-Improvement strategy
    pub fn new(spec: CoefficientSpec, n_initial_points: usize, limits: TunerLimits) -> Self {
        let strategy = Box::new(ExpectedImprovement::new(
            spec.min_value,
            spec.max_value,
            n_initial_points,
            spec.initial_step_size,
        ));
        Self::with_strategy(spec, limits, strategy)
    }

    /// Create a tuner around any conforming strategy
    pub fn with_strategy(
        spec: CoefficientSpec,
        limits: TunerLimits,
        strategy: Box<dyn ScalarOptimizer + Send>,
    ) -> Self {
        let step_size = spec.initial_step_size;
        let step_floor = spec.initial_step_size * limits.min_step_ratio;
        Self {
            spec,
            strategy,
            limits,
            step_size,
            step_floor,
            iteration_count: 0,
            consecutive_invalid: 0,
            current_proposal: None,
        }
    }

    /// The coefficient under tuning
    pub fn spec(&self) -> &CoefficientSpec {
        &self.spec
    }

    /// Candidate currently awaiting an observation, if any
    pub fn current_proposal(&self) -> Option<f64> {
        self.current_proposal
    }

    /// Current exploration step size
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Observations incorporated so far this phase
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// Current run of consecutive invalid readings
    pub fn consecutive_invalid(&self) -> usize {
        self.consecutive_invalid
    }

    /// Whether enough observations exist to trust the best value
    pub fn has_min_evidence(&self) -> bool {
        self.iteration_count >= self.limits.min_valid_shots
    }

    /// Propose the next candidate, clamped into the coefficient's domain
    ///
    /// Idempotent until the pending candidate is resolved by
    /// [`observe`](Self::observe): polling faster than shots arrive must not
    /// burn through proposals.
    pub fn propose(&mut self) -> f64 {
        if let Some(p) = self.current_proposal {
            return p;
        }

        self.strategy.set_exploration_scale(self.step_size);
        let candidate = self.spec.clamp(self.strategy.propose());
        self.current_proposal = Some(candidate);
        debug!(
            "{}: iteration {} proposes {}",
            self.spec.name,
            self.iteration_count + 1,
            candidate
        );
        candidate
    }

    /// Record the loss observed for the pending candidate
    pub fn observe(&mut self, loss: f64) {
        let Some(candidate) = self.current_proposal.take() else {
            // An observation with no pending proposal means the caller is
            // out of sync; drop it rather than poison the history
            debug!("{}: observation with no pending proposal", self.spec.name);
            return;
        };

        self.strategy.observe(candidate, loss);
        self.iteration_count += 1;
        self.consecutive_invalid = 0;

        if self.limits.step_decay_enabled {
            self.step_size = (self.step_size * self.spec.step_decay_rate).max(self.step_floor);
        }
    }

    /// Withdraw a pending candidate that was never published
    ///
    /// Called when the write carrying the proposal to the bus fails: the
    /// robot is still firing with the previous value, so no observation may
    /// be credited to this candidate. The next [`propose`](Self::propose)
    /// re-emits it (strategies are deterministic given their history), and
    /// the caller writes it again.
    pub fn withdraw_proposal(&mut self) {
        self.current_proposal = None;
    }

    /// Count one invalid reading against the phase budget
    pub fn record_invalid(&mut self) {
        self.consecutive_invalid += 1;
    }

    /// Best observed `(value, loss)`, value clamped into the domain
    pub fn best(&self) -> Option<(f64, f64)> {
        self.strategy
            .best()
            .map(|(v, y)| (self.spec.clamp(v), y))
    }

    /// Value to fall back to when the phase aborts
    pub fn fallback_value(&self) -> f64 {
        self.spec.default_value
    }

    /// Check whether the phase is over, and how
    ///
    /// The abort condition dominates: a coefficient under a failing sensor
    /// must revert even if its budget also happens to be spent.
    pub fn outcome(&self) -> Option<PhaseOutcome> {
        if self.consecutive_invalid >= self.limits.max_consecutive_invalid {
            return Some(PhaseOutcome::Aborted);
        }

        if self.iteration_count >= self.limits.n_calls {
            return Some(PhaseOutcome::Exhausted);
        }

        let at_floor = self.limits.step_decay_enabled
            && self.step_size <= self.step_floor * (1.0 + 1e-9);
        if at_floor && self.has_min_evidence() {
            return Some(PhaseOutcome::Converged);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::default_registry;
    use proptest::prelude::*;

    fn drag_spec() -> CoefficientSpec {
        default_registry()
            .into_iter()
            .find(|c| c.name == "kDragCoefficient")
            .unwrap()
    }

    fn limits() -> TunerLimits {
        TunerLimits {
            n_calls: 20,
            min_valid_shots: 3,
            max_consecutive_invalid: 5,
            step_decay_enabled: true,
            min_step_ratio: 0.1,
        }
    }

    #[test]
    fn warmup_points_span_domain_in_bounds() {
        let mut ei = ExpectedImprovement::new(-2.0, 6.0, 5, 1.0);
        let mut points = Vec::new();
        for _ in 0..5 {
            let p = ei.propose();
            assert!((-2.0..=6.0).contains(&p));
            points.push(p);
            ei.observe(p, 1.0);
        }

        // Low-discrepancy coverage: all warm-up points distinct and not
        // clustered at one end
        let min = points.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = points.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max - min > 4.0, "warm-up should span the domain");
    }

    #[test]
    fn acquisition_proposals_stay_in_bounds() {
        let mut ei = ExpectedImprovement::new(0.0, 1.0, 3, 0.2);
        for _ in 0..3 {
            let p = ei.propose();
            ei.observe(p, (p - 0.3).abs());
        }
        for _ in 0..10 {
            let p = ei.propose();
            assert!((0.0..=1.0).contains(&p));
            ei.observe(p, (p - 0.3).abs());
        }
    }

    #[test]
    fn ei_finds_minimum_of_smooth_loss() {
        let target = 0.35;
        let mut ei = ExpectedImprovement::new(0.0, 1.0, 5, 0.25);
        let mut scale = 0.25;
        for _ in 0..25 {
            ei.set_exploration_scale(scale);
            let p = ei.propose();
            ei.observe(p, (p - target).abs());
            scale = (scale * 0.9).max(0.025);
        }

        let (best_x, _) = ei.best().unwrap();
        assert!(
            (best_x - target).abs() < 0.05,
            "best {best_x} should be near {target}"
        );
    }

    #[test]
    fn best_tracks_lowest_loss_not_latest() {
        let mut ei = ExpectedImprovement::new(0.0, 1.0, 2, 0.2);
        ei.observe(0.4, 0.1);
        ei.observe(0.9, 5.0);
        assert_eq!(ei.best(), Some((0.4, 0.1)));
    }

    #[test]
    fn tuner_clamps_proposals() {
        struct OutOfBounds;
        impl ScalarOptimizer for OutOfBounds {
            fn propose(&mut self) -> f64 {
                99.0
            }
            fn observe(&mut self, _: f64, _: f64) {}
            fn best(&self) -> Option<(f64, f64)> {
                None
            }
        }

        let spec = drag_spec();
        let max = spec.max_value;
        let mut tuner = CoefficientTuner::with_strategy(spec, limits(), Box::new(OutOfBounds));
        assert_eq!(tuner.propose(), max);
    }

    #[test]
    fn proposal_is_idempotent_until_observed() {
        let mut tuner = CoefficientTuner::new(drag_spec(), 5, limits());
        let p1 = tuner.propose();
        let p2 = tuner.propose();
        assert_eq!(p1, p2);

        tuner.observe(1.0);
        assert_eq!(tuner.current_proposal(), None);
    }

    #[test]
    fn withdrawn_proposal_is_reissued() {
        let mut tuner = CoefficientTuner::new(drag_spec(), 5, limits());
        let p1 = tuner.propose();

        tuner.withdraw_proposal();
        assert_eq!(tuner.current_proposal(), None);

        // Same history, same candidate: the retry publishes the same value
        assert_eq!(tuner.propose(), p1);
        assert_eq!(tuner.iteration_count(), 0);
    }

    #[test]
    fn step_decay_law() {
        let spec = drag_spec();
        let initial = spec.initial_step_size;
        let rate = spec.step_decay_rate;
        let mut tuner = CoefficientTuner::new(spec, 5, limits());

        for n in 1..=30u32 {
            tuner.propose();
            tuner.observe(1.0);
            let expected = (initial * rate.powi(n as i32)).max(initial * 0.1);
            assert!(
                (tuner.step_size() - expected).abs() < 1e-12,
                "after {n} observations"
            );
        }

        // Floor reached and held
        assert!((tuner.step_size() - initial * 0.1).abs() < 1e-12);
    }

    #[test]
    fn decay_disabled_keeps_step() {
        let spec = drag_spec();
        let initial = spec.initial_step_size;
        let mut lim = limits();
        lim.step_decay_enabled = false;
        let mut tuner = CoefficientTuner::new(spec, 5, lim);

        for _ in 0..10 {
            tuner.propose();
            tuner.observe(1.0);
        }
        assert_eq!(tuner.step_size(), initial);
    }

    #[test]
    fn abort_after_consecutive_invalid() {
        let mut tuner = CoefficientTuner::new(drag_spec(), 5, limits());
        for _ in 0..4 {
            tuner.record_invalid();
            assert_eq!(tuner.outcome(), None);
        }
        tuner.record_invalid();
        assert_eq!(tuner.outcome(), Some(PhaseOutcome::Aborted));
    }

    #[test]
    fn valid_observation_resets_invalid_run() {
        let mut tuner = CoefficientTuner::new(drag_spec(), 5, limits());
        for _ in 0..4 {
            tuner.record_invalid();
        }
        tuner.propose();
        tuner.observe(1.0);
        assert_eq!(tuner.consecutive_invalid(), 0);
    }

    #[test]
    fn exhaustion_ends_phase() {
        let mut lim = limits();
        lim.step_decay_enabled = false; // rule out early convergence
        let mut tuner = CoefficientTuner::new(drag_spec(), 5, lim);
        for _ in 0..20 {
            assert_eq!(tuner.outcome(), None);
            tuner.propose();
            tuner.observe(1.0);
        }
        assert_eq!(tuner.outcome(), Some(PhaseOutcome::Exhausted));
    }

    #[test]
    fn convergence_needs_floor_and_evidence() {
        let spec = drag_spec();
        let mut lim = limits();
        lim.n_calls = 1000;
        let mut tuner = CoefficientTuner::new(spec, 5, lim);

        // Decay rate 0.9, floor ratio 0.1: floor reached after 22 decays
        let mut n = 0;
        while tuner.outcome().is_none() {
            tuner.propose();
            tuner.observe(1.0);
            n += 1;
            assert!(n < 100, "must converge once the step hits its floor");
        }
        assert_eq!(tuner.outcome(), Some(PhaseOutcome::Converged));
        assert!(n >= 3);
    }

    proptest! {
        #[test]
        fn step_decay_never_below_floor(observations in 0usize..200) {
            let spec = drag_spec();
            let floor = spec.initial_step_size * 0.1;
            let mut lim = limits();
            lim.n_calls = usize::MAX;
            let mut tuner = CoefficientTuner::new(spec, 5, lim);

            for _ in 0..observations {
                tuner.propose();
                tuner.observe(1.0);
            }
            prop_assert!(tuner.step_size() >= floor - 1e-15);
        }
    }
}
